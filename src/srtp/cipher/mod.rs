pub(crate) mod cipher_aes_cm_hmac_sha1;
pub(crate) mod cipher_null_hmac_sha1;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Error, Result};
use crate::srtp::key_derivation::*;
use crate::srtp::protection_profile::ProtectionProfile;

type HmacSha1 = Hmac<Sha1>;

/// A Cipher performs the protection transform of one direction. Buffers
/// passed to the RTP operations are full marshalled packets; the header is
/// authenticated but never encrypted.
pub(crate) trait Cipher {
    fn rtp_auth_tag_len(&self) -> usize;
    fn rtcp_auth_tag_len(&self) -> usize;
    fn get_rtcp_index(&self, input: &[u8]) -> usize;

    fn encrypt_rtp(
        &mut self,
        plaintext: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes>;

    fn decrypt_rtp(
        &mut self,
        encrypted: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes>;

    fn encrypt_rtcp(&mut self, plaintext: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;
}

/// State shared by the HMAC-SHA1 authenticated ciphers: derived session
/// salts and keyed session HMACs for both SRTP and SRTCP.
pub(crate) struct CipherInner {
    profile: ProtectionProfile,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: HmacSha1,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: HmacSha1,
}

impl CipherInner {
    pub(crate) fn new(
        profile: ProtectionProfile,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self> {
        let srtp_session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtcp_session_salt = aes_cm_key_derivation(
            LABEL_SRTCP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;

        let auth_key_len = profile.auth_key_len();

        let srtp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;
        let srtcp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTCP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;

        let srtp_session_auth = HmacSha1::new_from_slice(&srtp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;
        let srtcp_session_auth = HmacSha1::new_from_slice(&srtcp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            profile,
            srtp_session_salt,
            srtp_session_auth,
            srtcp_session_salt,
            srtcp_session_auth,
        })
    }

    pub(crate) fn profile(&self) -> ProtectionProfile {
        self.profile
    }

    pub(crate) fn srtp_session_salt(&self) -> &[u8] {
        &self.srtp_session_salt
    }

    pub(crate) fn srtcp_session_salt(&self) -> &[u8] {
        &self.srtcp_session_salt
    }

    /// https://tools.ietf.org/html/rfc3711#section-4.2
    ///
    /// The HMAC is applied over the authenticated portion of the packet
    /// concatenated with the big-endian rollover counter, then truncated by
    /// the caller to the profile tag length.
    pub(crate) fn generate_srtp_auth_tag(&self, buf: &[u8], roc: u32) -> [u8; 20] {
        let mut signer = self.srtp_session_auth.clone();

        signer.update(buf);
        signer.update(&roc.to_be_bytes());

        signer.finalize().into_bytes().into()
    }

    /// For SRTCP the authenticated portion already ends with the index word,
    /// so no trailer is appended.
    pub(crate) fn generate_srtcp_auth_tag(&self, buf: &[u8]) -> [u8; 20] {
        let mut signer = self.srtcp_session_auth.clone();

        signer.update(buf);

        signer.finalize().into_bytes().into()
    }

    /// Reads the 31 bit SRTCP index from the trailer, masking the E flag.
    pub(crate) fn get_rtcp_index(&self, input: &[u8]) -> usize {
        let tail_offset = input.len() - (self.profile.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE);
        (BigEndian::read_u32(&input[tail_offset..tail_offset + SRTCP_INDEX_SIZE]) & !(1 << 31))
            as usize
    }
}
