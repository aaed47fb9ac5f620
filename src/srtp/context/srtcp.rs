use bytes::Bytes;
use util::marshal::*;

use super::*;
use crate::srtp::key_derivation::SRTCP_INDEX_SIZE;

impl Context {
    /// decrypt_rtcp decrypts an RTCP packet with an encrypted payload.
    pub fn decrypt_rtcp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        let mut buf = encrypted;
        rtcp::header::Header::unmarshal(&mut buf)?;

        let min_len = rtcp::header::HEADER_LENGTH
            + rtcp::header::SSRC_LENGTH
            + SRTCP_INDEX_SIZE
            + self.cipher.rtcp_auth_tag_len();
        if encrypted.len() < min_len {
            return Err(Error::ErrTooShortRtcp);
        }

        let index = self.cipher.get_rtcp_index(encrypted);
        let ssrc = u32::from_be_bytes([encrypted[4], encrypted[5], encrypted[6], encrypted[7]]);

        if let Some(replay_detector) = &mut self.get_srtcp_ssrc_state(ssrc).replay_detector {
            if !replay_detector.check(index as u64) {
                return Err(Error::SrtcpSsrcDuplicated(ssrc, index));
            }
        }

        let dst = self.cipher.decrypt_rtcp(encrypted, index, ssrc)?;

        if let Some(replay_detector) = &mut self.get_srtcp_ssrc_state(ssrc).replay_detector {
            replay_detector.accept();
        }

        Ok(dst)
    }

    /// encrypt_rtcp protects a marshalled RTCP packet, appending the index
    /// word and the auth tag. The SRTCP index increments once per packet per
    /// sending SSRC and wraps at 2^31.
    pub fn encrypt_rtcp(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let mut buf = plaintext;
        rtcp::header::Header::unmarshal(&mut buf)?;

        if plaintext.len() < rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH {
            return Err(Error::ErrTooShortRtcp);
        }

        let ssrc = u32::from_be_bytes([plaintext[4], plaintext[5], plaintext[6], plaintext[7]]);

        let index = {
            let state = self.get_srtcp_ssrc_state(ssrc);
            state.srtcp_index += 1;
            if state.srtcp_index > MAX_SRTCP_INDEX {
                state.srtcp_index = 0;
            }
            state.srtcp_index
        };

        self.cipher.encrypt_rtcp(plaintext, index, ssrc)
    }
}
