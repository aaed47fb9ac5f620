use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{Error, Result};

pub(crate) const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub(crate) const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
pub(crate) const LABEL_SRTP_SALT: u8 = 0x02;
pub(crate) const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub(crate) const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
pub(crate) const LABEL_SRTCP_SALT: u8 = 0x05;

pub(crate) const SRTCP_INDEX_SIZE: usize = 4;

/// aes_cm_key_derivation derives a session key from the master key and salt,
/// https://tools.ietf.org/html/rfc3711#section-4.3
///
/// The input block for AES-CM is generated by exclusive-oring the master salt
/// with the concatenation of the label and (index DIV kdr), then padding on
/// the right with two null octets which implements the multiply-by-2^16
/// operation of section 4.3.3. The key derivation rate is fixed at zero, so
/// (index DIV kdr) is always zero as well.
pub(crate) fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    index_over_kdr: usize,
    out_len: usize,
) -> Result<Vec<u8>> {
    if index_over_kdr != 0 {
        return Err(Error::UnsupportedIndexOverKdr);
    }

    let n_master_key = master_key.len();
    let mut prf_in = vec![0u8; n_master_key];
    prf_in[..master_salt.len()].copy_from_slice(master_salt);

    prf_in[7] ^= label;

    // The resulting value is then AES-CM encrypted using the master key to
    // produce out_len bytes of session key, one block per 16 bit counter.
    let key = GenericArray::from_slice(master_key);
    let block = Aes128::new(key);

    let mut out = vec![0u8; out_len.div_ceil(n_master_key) * n_master_key];
    for (i, n) in (0..out_len).step_by(n_master_key).enumerate() {
        prf_in[n_master_key - 2] = ((i as u16) >> 8) as u8;
        prf_in[n_master_key - 1] = i as u8;

        let out_key = GenericArray::from_mut_slice(&mut out[n..n + n_master_key]);
        out_key.copy_from_slice(&prf_in);
        block.encrypt_block(out_key);
    }

    out.truncate(out_len);
    Ok(out)
}

/// generate_counter builds the 16 byte counter-mode IV for the given packet
/// index and SSRC, https://tools.ietf.org/html/rfc3711#section-4.1.1
pub(crate) fn generate_counter(
    sequence_number: u16,
    rollover_counter: u32,
    ssrc: u32,
    session_salt: &[u8],
) -> [u8; 16] {
    assert!(session_salt.len() <= 16);

    let mut counter = [0u8; 16];
    counter[4..8].copy_from_slice(&ssrc.to_be_bytes());
    counter[8..12].copy_from_slice(&rollover_counter.to_be_bytes());
    counter[12..16].copy_from_slice(&((sequence_number as u32) << 16).to_be_bytes());

    for (i, salt) in session_salt.iter().enumerate() {
        counter[i] ^= salt;
    }

    counter
}
