#![warn(rust_2018_idioms)]

//! DTLS-SRTP key establishment (RFC 5763/5764) and the SRTP/SRTCP
//! protection transforms (RFC 3711).
//!
//! The [`transport::DtlsSrtpTransport`] bridges a push-style inbound byte
//! stream and a pull-style outbound callback to the DTLS protocol engine,
//! negotiates an SRTP protection profile via the `use_srtp` extension, and
//! protects/unprotects RTP and RTCP packets with the negotiated keys.
//! [`sdes`] provides the parallel signalling-keyed path over the same
//! transforms.

pub mod alert;
pub mod certificate;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod mux;
pub mod peer;
pub mod sdes;
pub mod srtp;
pub mod transport;

pub use config::Config;
pub use error::{Error, HandshakeError, Result};
pub use peer::DtlsRole;
pub use srtp::protection_profile::ProtectionProfile;
pub use transport::DtlsSrtpTransport;
