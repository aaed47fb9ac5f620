//! SDES: SRTP keyed from signalling instead of DTLS (RFC 4568 `crypto`
//! attributes). The keys arrive base64 encoded as `key || salt` and feed the
//! same transformer contexts the DTLS path builds.

use std::fmt;
use std::str::FromStr;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use rand::RngCore;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::srtp::context::Context;
use crate::srtp::option::*;
use crate::srtp::protection_profile::ProtectionProfile;

const DEFAULT_SRTP_REPLAY_PROTECTION_WINDOW: usize = 64;
const DEFAULT_SRTCP_REPLAY_PROTECTION_WINDOW: usize = 64;

/// One `a=crypto:` attribute: `<tag> <suite> inline:<base64 key||salt>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptoAttribute {
    pub tag: u16,
    pub profile: ProtectionProfile,
    pub key_and_salt: Vec<u8>,
}

fn suite_name(profile: ProtectionProfile) -> &'static str {
    match profile {
        ProtectionProfile::Aes128CmHmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
        ProtectionProfile::Aes128CmHmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
        ProtectionProfile::NullHmacSha1_80 => "NULL_HMAC_SHA1_80",
        ProtectionProfile::NullHmacSha1_32 => "NULL_HMAC_SHA1_32",
    }
}

fn suite_from_name(name: &str) -> Result<ProtectionProfile> {
    match name {
        "AES_CM_128_HMAC_SHA1_80" => Ok(ProtectionProfile::Aes128CmHmacSha1_80),
        "AES_CM_128_HMAC_SHA1_32" => Ok(ProtectionProfile::Aes128CmHmacSha1_32),
        "NULL_HMAC_SHA1_80" => Ok(ProtectionProfile::NullHmacSha1_80),
        "NULL_HMAC_SHA1_32" => Ok(ProtectionProfile::NullHmacSha1_32),
        _ => Err(Error::NoMatchingCryptoSuite),
    }
}

impl fmt::Display for CryptoAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} inline:{}",
            self.tag,
            suite_name(self.profile),
            BASE64_STANDARD.encode(&self.key_and_salt)
        )
    }
}

impl FromStr for CryptoAttribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split_whitespace();

        let tag = fields
            .next()
            .ok_or_else(|| Error::InvalidCryptoAttribute("missing tag".to_owned()))?
            .parse::<u16>()
            .map_err(|e| Error::InvalidCryptoAttribute(format!("tag: {e}")))?;

        let profile = suite_from_name(
            fields
                .next()
                .ok_or_else(|| Error::InvalidCryptoAttribute("missing suite".to_owned()))?,
        )?;

        let key_params = fields
            .next()
            .ok_or_else(|| Error::InvalidCryptoAttribute("missing key params".to_owned()))?;
        let inline = key_params
            .strip_prefix("inline:")
            .ok_or_else(|| Error::InvalidCryptoAttribute("expected inline: keys".to_owned()))?;

        // Lifetime and MKI key parameters follow after '|'; only the
        // concatenated key is carried here.
        let encoded = inline.split('|').next().unwrap_or(inline);
        let key_and_salt = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidCryptoAttribute(format!("base64: {e}")))?;

        let expected = profile.keying_material_len() / 2;
        if key_and_salt.len() != expected {
            return Err(Error::InvalidCryptoAttribute(format!(
                "key material must be {expected} bytes, got {}",
                key_and_salt.len()
            )));
        }

        Ok(CryptoAttribute {
            tag,
            profile,
            key_and_salt,
        })
    }
}

impl CryptoAttribute {
    /// A fresh attribute with cryptographically random key material.
    pub fn generate(tag: u16, profile: ProtectionProfile) -> Self {
        let mut key_and_salt = vec![0u8; profile.key_len() + profile.salt_len()];
        rand::rng().fill_bytes(&mut key_and_salt);

        CryptoAttribute {
            tag,
            profile,
            key_and_salt,
        }
    }

    fn split_key(&self) -> (&[u8], &[u8]) {
        self.key_and_salt.split_at(self.profile.key_len())
    }
}

/// A bidirectional SRTP session keyed from signalling, reusing the
/// transformer contexts of the DTLS path. Encoder and decoder are locked
/// separately so sending never contends with receiving.
pub struct SdesSrtpSession {
    profile: ProtectionProfile,
    outbound: Mutex<Context>,
    inbound: Mutex<Context>,
}

impl SdesSrtpSession {
    pub fn new(local: &CryptoAttribute, remote: &CryptoAttribute) -> Result<Self> {
        if local.profile != remote.profile {
            return Err(Error::NoMatchingCryptoSuite);
        }

        let (local_key, local_salt) = local.split_key();
        let (remote_key, remote_salt) = remote.split_key();

        let outbound = Context::new(
            local_key,
            local_salt,
            local.profile,
            Some(srtp_no_replay_protection()),
            Some(srtcp_no_replay_protection()),
        )?;
        let inbound = Context::new(
            remote_key,
            remote_salt,
            remote.profile,
            Some(srtp_replay_protection(
                DEFAULT_SRTP_REPLAY_PROTECTION_WINDOW,
            )),
            Some(srtcp_replay_protection(
                DEFAULT_SRTCP_REPLAY_PROTECTION_WINDOW,
            )),
        )?;

        Ok(SdesSrtpSession {
            profile: local.profile,
            outbound: Mutex::new(outbound),
            inbound: Mutex::new(inbound),
        })
    }

    pub fn profile(&self) -> ProtectionProfile {
        self.profile
    }

    pub async fn protect_rtp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.outbound.lock().await.encrypt_rtp(pkt)
    }

    pub async fn unprotect_rtp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.inbound.lock().await.decrypt_rtp(pkt)
    }

    pub async fn protect_rtcp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.outbound.lock().await.encrypt_rtcp(pkt)
    }

    pub async fn unprotect_rtcp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.inbound.lock().await.decrypt_rtcp(pkt)
    }
}

/// An outgoing offer: one attribute with fresh keys per profile, in
/// preference order.
pub struct SdesOffer {
    attributes: Vec<CryptoAttribute>,
}

impl SdesOffer {
    pub fn new(profiles: &[ProtectionProfile]) -> Result<Self> {
        if profiles.is_empty() {
            return Err(Error::NoOfferedProfiles);
        }

        let attributes = profiles
            .iter()
            .enumerate()
            .map(|(i, profile)| CryptoAttribute::generate(i as u16 + 1, *profile))
            .collect();

        Ok(SdesOffer { attributes })
    }

    pub fn attributes(&self) -> &[CryptoAttribute] {
        &self.attributes
    }

    /// Completes the offer once the answer picked one of our attributes.
    pub fn accept_answer(&self, answer: &CryptoAttribute) -> Result<SdesSrtpSession> {
        let local = self
            .attributes
            .iter()
            .find(|a| a.tag == answer.tag && a.profile == answer.profile)
            .ok_or(Error::NoMatchingCryptoSuite)?;

        SdesSrtpSession::new(local, answer)
    }
}

/// Answers a remote offer: the first remote attribute with a supported
/// suite wins, mirroring the use_srtp selection rule. Returns the answer
/// attribute to signal back together with the ready session.
pub fn negotiate_from_offer(
    remote_attributes: &[CryptoAttribute],
) -> Result<(CryptoAttribute, SdesSrtpSession)> {
    let remote = remote_attributes
        .first()
        .ok_or(Error::NoMatchingCryptoSuite)?;

    let local = CryptoAttribute::generate(remote.tag, remote.profile);
    let session = SdesSrtpSession::new(&local, remote)?;

    Ok((local, session))
}

#[cfg(test)]
mod sdes_test {
    use bytes::Bytes;
    use util::marshal::*;

    use super::*;

    fn test_rtp_packet(sequence_number: u16) -> Result<Bytes> {
        let pkt = rtp::packet::Packet {
            header: rtp::header::Header {
                version: 2,
                ssrc: 0x1234,
                sequence_number,
                ..Default::default()
            },
            payload: Bytes::from_static(&[9, 8, 7, 6]),
        };
        Ok(pkt.marshal()?)
    }

    #[test]
    fn test_crypto_attribute_round_trip() -> Result<()> {
        let attr = CryptoAttribute::generate(1, ProtectionProfile::Aes128CmHmacSha1_80);
        let parsed: CryptoAttribute = attr.to_string().parse()?;
        assert_eq!(parsed, attr);
        Ok(())
    }

    #[test]
    fn test_crypto_attribute_parses_key_parameters() -> Result<()> {
        let attr: CryptoAttribute =
            "1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR|2^20|1:4"
                .parse()?;
        assert_eq!(attr.tag, 1);
        assert_eq!(attr.profile, ProtectionProfile::Aes128CmHmacSha1_80);
        assert_eq!(attr.key_and_salt.len(), 30);
        Ok(())
    }

    #[test]
    fn test_crypto_attribute_rejects_garbage() {
        for input in [
            "",
            "1",
            "1 AES_CM_128_HMAC_SHA1_80",
            "1 TWOFISH_CM_128 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR",
            "1 AES_CM_128_HMAC_SHA1_80 inline:!!!",
            "1 AES_CM_128_HMAC_SHA1_80 inline:c2hvcnQ=",
        ] {
            assert!(
                input.parse::<CryptoAttribute>().is_err(),
                "accepted {input:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_offer_answer_media_round_trip() -> Result<()> {
        let offer = SdesOffer::new(&[
            ProtectionProfile::Aes128CmHmacSha1_80,
            ProtectionProfile::Aes128CmHmacSha1_32,
        ])?;

        let (answer, responder) = negotiate_from_offer(offer.attributes())?;
        assert_eq!(answer.profile, ProtectionProfile::Aes128CmHmacSha1_80);

        let offerer = offer.accept_answer(&answer)?;

        let raw = test_rtp_packet(1)?;
        let protected = offerer.protect_rtp(&raw).await?;
        assert_eq!(responder.unprotect_rtp(&protected).await?, raw);

        let raw = test_rtp_packet(1)?;
        let protected = responder.protect_rtp(&raw).await?;
        assert_eq!(offerer.unprotect_rtp(&protected).await?, raw);

        Ok(())
    }

    #[tokio::test]
    async fn test_null_suite_session() -> Result<()> {
        let offer = SdesOffer::new(&[ProtectionProfile::NullHmacSha1_80])?;
        let (answer, responder) = negotiate_from_offer(offer.attributes())?;
        let offerer = offer.accept_answer(&answer)?;

        let raw = test_rtp_packet(3)?;
        let protected = offerer.protect_rtp(&raw).await?;

        // NULL keeps the payload readable but still authenticated.
        assert_eq!(&protected[..raw.len()], &raw[..]);
        assert_eq!(responder.unprotect_rtp(&protected).await?, raw);

        let mut tampered = protected.to_vec();
        tampered[raw.len() - 1] ^= 0xFF;
        assert_eq!(
            responder.unprotect_rtp(&tampered).await.err(),
            Some(Error::RtpFailedToVerifyAuthTag)
        );

        Ok(())
    }
}
