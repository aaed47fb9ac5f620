use bytes::{BufMut, Bytes};
use subtle::ConstantTimeEq;

use super::{Cipher, CipherInner};
use crate::error::{Error, Result};
use crate::srtp::key_derivation::SRTCP_INDEX_SIZE;
use crate::srtp::protection_profile::ProtectionProfile;

/// NULL cipher: the payload travels in the clear but packets still carry a
/// verified HMAC-SHA1 tag. The session auth keys are derived exactly as for
/// the AES-CM profiles.
pub(crate) struct CipherNullHmacSha1 {
    inner: CipherInner,
}

impl CipherNullHmacSha1 {
    pub(crate) fn new(
        profile: ProtectionProfile,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self> {
        let inner = CipherInner::new(profile, master_key, master_salt)?;

        Ok(CipherNullHmacSha1 { inner })
    }
}

impl Cipher for CipherNullHmacSha1 {
    fn rtp_auth_tag_len(&self) -> usize {
        self.inner.profile().rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.inner.profile().rtcp_auth_tag_len()
    }

    fn get_rtcp_index(&self, input: &[u8]) -> usize {
        self.inner.get_rtcp_index(input)
    }

    fn encrypt_rtp(
        &mut self,
        plaintext: &[u8],
        _header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        let mut writer = Vec::with_capacity(plaintext.len() + self.rtp_auth_tag_len());

        writer.extend_from_slice(plaintext);

        let auth_tag = &self.inner.generate_srtp_auth_tag(&writer, roc)[..self.rtp_auth_tag_len()];
        writer.extend_from_slice(auth_tag);

        Ok(Bytes::from(writer))
    }

    fn decrypt_rtp(
        &mut self,
        encrypted: &[u8],
        _header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        let encrypted_len = encrypted.len();
        if encrypted_len < self.rtp_auth_tag_len() {
            return Err(Error::SrtpTooSmall(encrypted_len, self.rtp_auth_tag_len()));
        }

        let actual_tag = &encrypted[encrypted_len - self.rtp_auth_tag_len()..];
        let plain_text = &encrypted[..encrypted_len - self.rtp_auth_tag_len()];

        let expected_tag =
            &self.inner.generate_srtp_auth_tag(plain_text, roc)[..self.rtp_auth_tag_len()];
        if actual_tag.ct_eq(expected_tag).unwrap_u8() != 1 {
            return Err(Error::RtpFailedToVerifyAuthTag);
        }

        Ok(Bytes::copy_from_slice(plain_text))
    }

    fn encrypt_rtcp(&mut self, plaintext: &[u8], srtcp_index: usize, _ssrc: u32) -> Result<Bytes> {
        let mut writer =
            Vec::with_capacity(plaintext.len() + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len());

        writer.extend_from_slice(plaintext);

        // Index word with the E flag clear.
        writer.put_u32(srtcp_index as u32);

        let auth_tag = &self.inner.generate_srtcp_auth_tag(&writer)[..self.rtcp_auth_tag_len()];
        writer.extend_from_slice(auth_tag);

        Ok(Bytes::from(writer))
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], _srtcp_index: usize, _ssrc: u32) -> Result<Bytes> {
        let encrypted_len = encrypted.len();
        if encrypted_len < self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE {
            return Err(Error::SrtcpTooSmall(
                encrypted_len,
                self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE,
            ));
        }

        let tail_offset = encrypted_len - (self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE);

        let actual_tag = &encrypted[encrypted_len - self.rtcp_auth_tag_len()..];
        let plain_text = &encrypted[..encrypted_len - self.rtcp_auth_tag_len()];

        let expected_tag =
            &self.inner.generate_srtcp_auth_tag(plain_text)[..self.rtcp_auth_tag_len()];
        if actual_tag.ct_eq(expected_tag).unwrap_u8() != 1 {
            return Err(Error::RtcpFailedToVerifyAuthTag);
        }

        Ok(Bytes::copy_from_slice(&encrypted[..tail_offset]))
    }
}
