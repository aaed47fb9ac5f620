use dtls::cipher_suite::CipherSuiteId;
use dtls::config::{ClientAuthType, Config as DtlsConfig, ExtendedMasterSecretType};
use dtls::extension::extension_use_srtp::SrtpProtectionProfile;

use crate::certificate::Certificate;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::srtp::protection_profile::ProtectionProfile;

/// Which side of the handshake this peer drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

/// The keying material block pulled from the DTLS exporter with the
/// `EXTRACTOR-dtls_srtp` label, partitioned exactly as
/// `[client_key | server_key | client_salt | server_salt]` (RFC 5764
/// section 4.2).
#[derive(Clone)]
pub struct SrtpKeyingMaterial {
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_salt: Vec<u8>,
    pub server_salt: Vec<u8>,
}

impl SrtpKeyingMaterial {
    pub(crate) fn partition(profile: ProtectionProfile, keying_material: &[u8]) -> Result<Self> {
        let key_len = profile.key_len();
        let salt_len = profile.salt_len();
        if keying_material.len() != 2 * (key_len + salt_len) {
            return Err(Error::Other(format!(
                "keying material must be {} bytes, got {}",
                2 * (key_len + salt_len),
                keying_material.len()
            )));
        }

        let mut offset = 0;
        let client_key = keying_material[offset..offset + key_len].to_vec();
        offset += key_len;

        let server_key = keying_material[offset..offset + key_len].to_vec();
        offset += key_len;

        let client_salt = keying_material[offset..offset + salt_len].to_vec();
        offset += salt_len;

        let server_salt = keying_material[offset..offset + salt_len].to_vec();

        Ok(SrtpKeyingMaterial {
            client_key,
            server_key,
            client_salt,
            server_salt,
        })
    }
}

/// Master key and salt pair for each direction, oriented by role: the
/// client writes with the client half of the partition.
pub(crate) struct StreamKeys {
    pub(crate) local_master_key: Vec<u8>,
    pub(crate) local_master_salt: Vec<u8>,
    pub(crate) remote_master_key: Vec<u8>,
    pub(crate) remote_master_salt: Vec<u8>,
}

/// The role-bearing handshake participant. Created before the handshake,
/// mutated only by the handshake task, then read-only.
pub struct DtlsSrtpPeer {
    role: DtlsRole,
    certificate: Certificate,
    offered_profiles: Vec<ProtectionProfile>,
    negotiated_profile: Option<ProtectionProfile>,
    keying_material: Option<SrtpKeyingMaterial>,
    remote_certificates: Vec<Vec<u8>>,
}

impl DtlsSrtpPeer {
    pub(crate) fn new(
        role: DtlsRole,
        certificate: Certificate,
        offered_profiles: Vec<ProtectionProfile>,
    ) -> Result<Self> {
        if offered_profiles.is_empty() {
            return Err(Error::NoOfferedProfiles);
        }

        Ok(DtlsSrtpPeer {
            role,
            certificate,
            offered_profiles,
            negotiated_profile: None,
            keying_material: None,
            remote_certificates: vec![],
        })
    }

    pub fn role(&self) -> DtlsRole {
        self.role
    }

    pub fn fingerprint(&self) -> &str {
        self.certificate.fingerprint()
    }

    pub fn offered_profiles(&self) -> &[ProtectionProfile] {
        &self.offered_profiles
    }

    /// Set once the use_srtp exchange has happened.
    pub fn negotiated_profile(&self) -> Option<ProtectionProfile> {
        self.negotiated_profile
    }

    /// The remote chain in DER form, leaf first; empty before completion.
    pub fn remote_certificates(&self) -> &[Vec<u8>] {
        &self.remote_certificates
    }

    pub fn keying_material(&self) -> Option<&SrtpKeyingMaterial> {
        self.keying_material.as_ref()
    }

    /// An ECDSA leaf can only prove possession inside the ECDHE-ECDSA key
    /// exchange, so the advertised suites follow the local certificate.
    /// The remote certificate never constrains this list.
    pub(crate) fn cipher_suites(&self) -> Vec<CipherSuiteId> {
        if self.certificate.is_ecdsa() {
            vec![
                CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256,
                CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_256_Cbc_Sha,
            ]
        } else {
            vec![
                CipherSuiteId::Tls_Ecdhe_Rsa_With_Aes_128_Gcm_Sha256,
                CipherSuiteId::Tls_Ecdhe_Rsa_With_Aes_256_Cbc_Sha,
            ]
        }
    }

    /// use_srtp code points for the offer, in preference order. The
    /// extension cannot carry the NULL profiles; those stay reachable
    /// through the signalling-keyed path.
    pub(crate) fn wire_profiles(&self) -> Vec<SrtpProtectionProfile> {
        let mut profiles = vec![];
        for profile in &self.offered_profiles {
            match profile {
                ProtectionProfile::Aes128CmHmacSha1_80 => {
                    profiles.push(SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80)
                }
                ProtectionProfile::Aes128CmHmacSha1_32 => {
                    profiles.push(SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32)
                }
                other => log::warn!("{other} cannot be offered in use_srtp, skipping"),
            }
        }
        profiles
    }

    pub(crate) fn dtls_config(&self, config: &Config) -> DtlsConfig {
        DtlsConfig {
            certificates: vec![self.certificate.certificate.clone()],
            cipher_suites: self.cipher_suites(),
            srtp_protection_profiles: self.wire_profiles(),
            extended_master_secret: if config.require_extended_master_secret {
                ExtendedMasterSecretType::Require
            } else {
                ExtendedMasterSecretType::Request
            },
            client_auth: if self.role == DtlsRole::Server {
                ClientAuthType::RequireAnyClientCert
            } else {
                ClientAuthType::NoClientCert
            },
            flight_interval: config.retransmission_interval,
            // Fingerprints are delivered and checked by the signalling layer.
            insecure_skip_verify: true,
            mtu: config.send_limit(),
            ..Default::default()
        }
    }

    /// Called exactly once by the handshake task; the master secret itself
    /// never leaves the engine state.
    pub(crate) fn install(
        &mut self,
        profile: ProtectionProfile,
        keying_material: SrtpKeyingMaterial,
        remote_certificates: Vec<Vec<u8>>,
    ) {
        self.negotiated_profile = Some(profile);
        self.keying_material = Some(keying_material);
        self.remote_certificates = remote_certificates;
    }

    pub(crate) fn stream_keys(&self) -> Result<StreamKeys> {
        let keys = self
            .keying_material
            .as_ref()
            .ok_or(Error::HandshakeNotComplete)?;

        Ok(match self.role {
            DtlsRole::Client => StreamKeys {
                local_master_key: keys.client_key.clone(),
                local_master_salt: keys.client_salt.clone(),
                remote_master_key: keys.server_key.clone(),
                remote_master_salt: keys.server_salt.clone(),
            },
            DtlsRole::Server => StreamKeys {
                local_master_key: keys.server_key.clone(),
                local_master_salt: keys.server_salt.clone(),
                remote_master_key: keys.client_key.clone(),
                remote_master_salt: keys.client_salt.clone(),
            },
        })
    }
}

/// Maps the negotiated extension code point back to a protection profile.
pub(crate) fn profile_from_wire(profile: SrtpProtectionProfile) -> Result<ProtectionProfile> {
    match profile {
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80 => {
            Ok(ProtectionProfile::Aes128CmHmacSha1_80)
        }
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32 => {
            Ok(ProtectionProfile::Aes128CmHmacSha1_32)
        }
        _ => Err(Error::NoSrtpProtectionProfile),
    }
}
