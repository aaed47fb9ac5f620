use std::fmt;

use crate::error::{Error, Result};

/// ProtectionProfile specifies the cipher and auth tag details of an SRTP
/// protection profile, similar to a TLS cipher suite.
/// https://tools.ietf.org/html/rfc5764#section-4.1.2
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProtectionProfile {
    #[default]
    Aes128CmHmacSha1_80 = 0x0001,
    Aes128CmHmacSha1_32 = 0x0002,
    NullHmacSha1_80 = 0x0005,
    NullHmacSha1_32 = 0x0006,
}

impl fmt::Display for ProtectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 => write!(f, "SRTP_AES128_CM_HMAC_SHA1_80"),
            ProtectionProfile::Aes128CmHmacSha1_32 => write!(f, "SRTP_AES128_CM_HMAC_SHA1_32"),
            ProtectionProfile::NullHmacSha1_80 => write!(f, "SRTP_NULL_HMAC_SHA1_80"),
            ProtectionProfile::NullHmacSha1_32 => write!(f, "SRTP_NULL_HMAC_SHA1_32"),
        }
    }
}

impl ProtectionProfile {
    /// Looks up a profile by its IANA code point.
    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            0x0001 => Ok(ProtectionProfile::Aes128CmHmacSha1_80),
            0x0002 => Ok(ProtectionProfile::Aes128CmHmacSha1_32),
            0x0005 => Ok(ProtectionProfile::NullHmacSha1_80),
            0x0006 => Ok(ProtectionProfile::NullHmacSha1_32),
            _ => Err(Error::UnsupportedProfile(id)),
        }
    }

    /// The IANA code point carried in the use_srtp extension.
    pub fn id(&self) -> u16 {
        *self as u16
    }

    /// Master/session encryption key length. The NULL profiles carry the
    /// same 128 bit master key as the AES-CM ones; only the session
    /// encryption step is disabled.
    pub(crate) fn key_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::NullHmacSha1_80
            | ProtectionProfile::NullHmacSha1_32 => 16,
        }
    }

    pub(crate) fn salt_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::NullHmacSha1_80
            | ProtectionProfile::NullHmacSha1_32 => 14,
        }
    }

    pub(crate) fn auth_key_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::NullHmacSha1_80
            | ProtectionProfile::NullHmacSha1_32 => 20,
        }
    }

    pub(crate) fn rtp_auth_tag_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::NullHmacSha1_80 => 10,
            ProtectionProfile::Aes128CmHmacSha1_32 | ProtectionProfile::NullHmacSha1_32 => 4,
        }
    }

    /// SRTCP always uses the 80 bit tag, also for the *_32 profiles
    /// (RFC 5764 section 4.1.2).
    pub(crate) fn rtcp_auth_tag_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::NullHmacSha1_80
            | ProtectionProfile::NullHmacSha1_32 => 10,
        }
    }

    /// Whether the payload is encrypted at all.
    pub(crate) fn is_encrypted(&self) -> bool {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes128CmHmacSha1_32 => true,
            ProtectionProfile::NullHmacSha1_80 | ProtectionProfile::NullHmacSha1_32 => false,
        }
    }

    /// Length of the keying material block pulled from the DTLS exporter:
    /// client and server write keys followed by both salts.
    pub fn keying_material_len(&self) -> usize {
        2 * (self.key_len() + self.salt_len())
    }

    /// Validates externally supplied master key material against the
    /// profile's declared lengths.
    pub(crate) fn check_master_key(&self, master_key: &[u8], master_salt: &[u8]) -> Result<()> {
        if master_key.len() != self.key_len() {
            return Err(Error::SrtpMasterKeyLength(self.key_len(), master_key.len()));
        }
        if master_salt.len() != self.salt_len() {
            return Err(Error::SrtpSaltLength(self.salt_len(), master_salt.len()));
        }
        Ok(())
    }
}
