use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::{Error, Result};

/// OID arc shared by the ecdsa-with-SHA* signature algorithms.
const OID_ECDSA_WITH_SHA: &str = "1.2.840.10045.4.3";

/// A local certificate chain plus private key, with the derived attributes
/// the peer needs: the RFC 8122 fingerprint of the leaf and whether the leaf
/// is ECDSA signed (which constrains the offerable cipher suites).
#[derive(Clone)]
pub struct Certificate {
    pub(crate) certificate: dtls::crypto::Certificate,
    fingerprint: String,
    is_ecdsa: bool,
}

impl Certificate {
    /// Generates a self-signed ECDSA P-256 certificate with a random
    /// subject, the way WebRTC endpoints usually do.
    pub fn generate_self_signed() -> Result<Self> {
        let subject: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let certificate = dtls::crypto::Certificate::generate_self_signed(vec![subject])?;

        Self::from_dtls_certificate(certificate)
    }

    /// Wraps a supplied chain and key, leaf first.
    pub fn from_dtls_certificate(certificate: dtls::crypto::Certificate) -> Result<Self> {
        let leaf = certificate.certificate.first().ok_or(Error::NoCertificate)?;
        let der: &[u8] = leaf.as_ref();

        let fingerprint = fingerprint(der);
        let is_ecdsa = signature_is_ecdsa(der)?;

        Ok(Certificate {
            certificate,
            fingerprint,
            is_ecdsa,
        })
    }

    /// `"sha-256 "` followed by the uppercase colon-separated SHA-256 digest
    /// of the leaf certificate in DER form.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_ecdsa(&self) -> bool {
        self.is_ecdsa
    }
}

fn fingerprint(der: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(der);
    let hashed = h.finalize();
    let values: Vec<String> = hashed.iter().map(|x| format!("{x:02X}")).collect();

    format!("sha-256 {}", values.join(":"))
}

fn signature_is_ecdsa(der: &[u8]) -> Result<bool> {
    let (_, cert) =
        parse_x509_certificate(der).map_err(|e| Error::Other(format!("x509: {e}")))?;

    Ok(cert
        .signature_algorithm
        .algorithm
        .to_id_string()
        .starts_with(OID_ECDSA_WITH_SHA))
}

#[cfg(test)]
mod certificate_test {
    use super::*;

    #[test]
    fn test_generated_certificate_is_ecdsa() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        assert!(cert.is_ecdsa(), "rcgen self-signed default must be ECDSA");
        Ok(())
    }

    #[test]
    fn test_fingerprint_format() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        let fingerprint = cert.fingerprint();

        let value = fingerprint
            .strip_prefix("sha-256 ")
            .expect("missing algorithm prefix");
        let parts: Vec<&str> = value.split(':').collect();
        assert_eq!(parts.len(), 32);
        assert_eq!(value.len(), 95);
        for part in parts {
            assert_eq!(part.len(), 2);
            assert!(part
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_stable() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        let again = Certificate::from_dtls_certificate(cert.certificate.clone())?;
        assert_eq!(cert.fingerprint(), again.fingerprint());
        Ok(())
    }
}
