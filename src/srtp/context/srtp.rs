use bytes::Bytes;
use util::marshal::*;

use super::*;

impl Context {
    pub fn decrypt_rtp_with_header(
        &mut self,
        encrypted: &[u8],
        header: &rtp::header::Header,
    ) -> Result<Bytes> {
        // The packet must at least hold the parsed header and the tag; the
        // cipher re-checks the tag split on its own.
        let min_len = header.marshal_size() + self.cipher.rtp_auth_tag_len();
        if encrypted.len() < min_len {
            return Err(Error::ErrTooShortRtp);
        }

        let roc = {
            let state = self.get_srtp_ssrc_state(header.ssrc);
            let (roc, _) = state.estimate_rollover_count(header.sequence_number);

            if let Some(replay_detector) = &mut state.replay_detector {
                if !replay_detector.check(header.sequence_number as u64) {
                    return Err(Error::SrtpSsrcDuplicated(
                        header.ssrc,
                        header.sequence_number,
                    ));
                }
            }

            roc
        };

        let dst = self.cipher.decrypt_rtp(encrypted, header, roc)?;

        // Only an authenticated packet may advance the replay window and
        // the rollover state.
        let state = self.get_srtp_ssrc_state(header.ssrc);
        if let Some(replay_detector) = &mut state.replay_detector {
            replay_detector.accept();
        }
        state.commit(header.sequence_number, roc);

        Ok(dst)
    }

    /// decrypt_rtp decrypts an RTP packet with an encrypted payload.
    pub fn decrypt_rtp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        let mut buf = encrypted;
        let header = rtp::header::Header::unmarshal(&mut buf)?;
        self.decrypt_rtp_with_header(encrypted, &header)
    }

    pub fn encrypt_rtp_with_header(
        &mut self,
        plaintext: &[u8],
        header: &rtp::header::Header,
    ) -> Result<Bytes> {
        let (roc, exhausted) = self
            .get_srtp_ssrc_state(header.ssrc)
            .estimate_rollover_count(header.sequence_number);
        if exhausted {
            // 2^48 packets under one master key; the key management must
            // rekey or the session must end,
            // https://www.rfc-editor.org/rfc/rfc3711#section-9.2
            return Err(Error::ErrExceededMaxPackets);
        }

        let dst = self.cipher.encrypt_rtp(plaintext, header, roc)?;

        self.get_srtp_ssrc_state(header.ssrc)
            .commit(header.sequence_number, roc);

        Ok(dst)
    }

    /// encrypt_rtp protects a marshalled RTP packet, appending the auth tag.
    pub fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let mut buf = plaintext;
        let header = rtp::header::Header::unmarshal(&mut buf)?;
        self.encrypt_rtp_with_header(plaintext, &header)
    }
}
