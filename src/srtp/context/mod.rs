#[cfg(test)]
mod context_test;

use std::collections::HashMap;

use util::replay_detector::*;

use crate::error::{Error, Result};
use crate::srtp::cipher::cipher_aes_cm_hmac_sha1::CipherAesCmHmacSha1;
use crate::srtp::cipher::cipher_null_hmac_sha1::CipherNullHmacSha1;
use crate::srtp::cipher::Cipher;
use crate::srtp::option::*;
use crate::srtp::protection_profile::ProtectionProfile;

pub mod srtcp;
pub mod srtp;

pub(crate) const MAX_ROC: u32 = u32::MAX;
pub(crate) const SEQ_NUM_MEDIAN: u16 = 1 << 15;
pub(crate) const MAX_SEQUENCE_NUMBER: u16 = u16::MAX;
pub(crate) const MAX_SRTCP_INDEX: usize = 0x7FFF_FFFF;

/// Encrypt/decrypt state for a single SRTP SSRC. The 48 bit packet index is
/// kept as the rollover counter plus the highest authenticated sequence
/// number, per https://tools.ietf.org/html/rfc3711#section-3.3.1
#[derive(Default)]
pub(crate) struct SrtpSsrcState {
    rollover_counter: u32,
    highest_sequence: u16,
    seen_first_packet: bool,
    replay_detector: Option<Box<dyn ReplayDetector + Send + 'static>>,
}

/// Encrypt/decrypt state for a single SRTCP SSRC.
#[derive(Default)]
pub(crate) struct SrtcpSsrcState {
    srtcp_index: usize,
    replay_detector: Option<Box<dyn ReplayDetector + Send + 'static>>,
}

impl SrtpSsrcState {
    /// Picks the rollover counter candidate that places the sequence number
    /// nearest the highest index seen so far, one of ROC-1, ROC or ROC+1
    /// (https://tools.ietf.org/html/rfc3711#appendix-A). The flag reports
    /// that accepting the guess would step the index past 2^48 packets.
    pub fn estimate_rollover_count(&self, sequence_number: u16) -> (u32, bool) {
        if !self.seen_first_packet {
            return (self.rollover_counter, false);
        }

        let roc = self.rollover_counter;
        let s_l = self.highest_sequence;

        if s_l < SEQ_NUM_MEDIAN {
            // A stream still in its first rollover window cannot have a
            // straggler from before a wrap; never guess below ROC 0.
            if (sequence_number as i32) - (s_l as i32) > SEQ_NUM_MEDIAN as i32 && roc > 0 {
                return (roc - 1, false);
            }
        } else if s_l - SEQ_NUM_MEDIAN > sequence_number {
            return (roc.wrapping_add(1), roc == MAX_ROC);
        }

        (roc, false)
    }

    /// Commits an authenticated packet, advancing the highest index only
    /// when the packet moves it forward. Reordered packets from the past
    /// leave the state untouched.
    pub fn commit(&mut self, sequence_number: u16, guessed_roc: u32) {
        if !self.seen_first_packet {
            self.highest_sequence = sequence_number;
            self.seen_first_packet = true;
            return;
        }

        if guessed_roc == self.rollover_counter.wrapping_add(1) {
            self.rollover_counter = guessed_roc;
            self.highest_sequence = sequence_number;
        } else if guessed_roc == self.rollover_counter
            && sequence_number > self.highest_sequence
        {
            self.highest_sequence = sequence_number;
        }
    }
}

/// Context represents an SRTP cryptographic context.
/// A Context can only be used for one-way operations: it must either be used
/// ONLY for encryption or ONLY for decryption.
pub struct Context {
    cipher: Box<dyn Cipher + Send>,

    srtp_ssrc_states: HashMap<u32, SrtpSsrcState>,
    srtcp_ssrc_states: HashMap<u32, SrtcpSsrcState>,

    new_srtp_replay_detector: ContextOption,
    new_srtcp_replay_detector: ContextOption,
}

impl Context {
    /// Creates a new SRTP Context for the given master key and salt.
    pub fn new(
        master_key: &[u8],
        master_salt: &[u8],
        profile: ProtectionProfile,
        srtp_ctx_opt: Option<ContextOption>,
        srtcp_ctx_opt: Option<ContextOption>,
    ) -> Result<Context> {
        profile.check_master_key(master_key, master_salt)?;

        let cipher: Box<dyn Cipher + Send> = if profile.is_encrypted() {
            Box::new(CipherAesCmHmacSha1::new(profile, master_key, master_salt)?)
        } else {
            Box::new(CipherNullHmacSha1::new(profile, master_key, master_salt)?)
        };

        Ok(Context {
            cipher,
            srtp_ssrc_states: HashMap::new(),
            srtcp_ssrc_states: HashMap::new(),
            new_srtp_replay_detector: srtp_ctx_opt.unwrap_or_else(srtp_no_replay_protection),
            new_srtcp_replay_detector: srtcp_ctx_opt.unwrap_or_else(srtcp_no_replay_protection),
        })
    }

    fn get_srtp_ssrc_state(&mut self, ssrc: u32) -> &mut SrtpSsrcState {
        let s = SrtpSsrcState {
            replay_detector: Some((self.new_srtp_replay_detector)()),
            ..Default::default()
        };

        self.srtp_ssrc_states.entry(ssrc).or_insert(s)
    }

    fn get_srtcp_ssrc_state(&mut self, ssrc: u32) -> &mut SrtcpSsrcState {
        let s = SrtcpSsrcState {
            replay_detector: Some((self.new_srtcp_replay_detector)()),
            ..Default::default()
        };
        self.srtcp_ssrc_states.entry(ssrc).or_insert(s)
    }

    /// roc returns the SRTP rollover counter of the specified SSRC.
    pub fn roc(&self, ssrc: u32) -> Option<u32> {
        self.srtp_ssrc_states
            .get(&ssrc)
            .map(|s| s.rollover_counter)
    }

    /// set_roc sets the SRTP rollover counter of the specified SSRC.
    pub fn set_roc(&mut self, ssrc: u32, roc: u32) {
        let state = self.get_srtp_ssrc_state(ssrc);
        state.rollover_counter = roc;
        state.highest_sequence = 0;
        state.seen_first_packet = false;
    }

    /// index returns the SRTCP index of the specified SSRC.
    pub fn index(&self, ssrc: u32) -> Option<usize> {
        self.srtcp_ssrc_states.get(&ssrc).map(|s| s.srtcp_index)
    }

    /// set_index sets the SRTCP index of the specified SSRC.
    pub fn set_index(&mut self, ssrc: u32, index: usize) {
        self.get_srtcp_ssrc_state(ssrc).srtcp_index = index % (MAX_SRTCP_INDEX + 1);
    }
}
