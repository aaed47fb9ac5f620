use std::io;

use thiserror::Error;

use crate::alert::AlertDescription;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("no such SRTP protection profile: {0:#06x}")]
    UnsupportedProfile(u16),
    #[error("SRTP master key must be len {0}, got {1}")]
    SrtpMasterKeyLength(usize, usize),
    #[error("SRTP master salt must be len {0}, got {1}")]
    SrtpSaltLength(usize, usize),
    #[error("index_over_kdr > 0 is not supported yet")]
    UnsupportedIndexOverKdr,
    #[error("packet is too short to be an RTP packet")]
    ErrTooShortRtp,
    #[error("packet is too short to be an RTCP packet")]
    ErrTooShortRtcp,
    #[error("too short SRTP packet: only {0} bytes, expected > {1} bytes")]
    SrtpTooSmall(usize, usize),
    #[error("too short SRTCP packet: only {0} bytes, expected > {1} bytes")]
    SrtcpTooSmall(usize, usize),
    #[error("srtp ssrc={0} index={1}: duplicated")]
    SrtpSsrcDuplicated(u32, u16),
    #[error("srtcp ssrc={0} index={1}: duplicated")]
    SrtcpSsrcDuplicated(u32, usize),
    #[error("failed to verify rtp auth tag")]
    RtpFailedToVerifyAuthTag,
    #[error("failed to verify rtcp auth tag")]
    RtcpFailedToVerifyAuthTag,
    #[error("too short auth tag: only {0} bytes, expected {1} bytes")]
    RtcpInvalidLengthAuthTag(usize, usize),
    #[error("exceeded the maximum number of packets")]
    ErrExceededMaxPackets,

    #[error("handshake has not completed yet")]
    HandshakeNotComplete,
    #[error("handshake is already in progress")]
    HandshakeInProgress,
    #[error("transport is closed")]
    TransportClosed,
    #[error("no SRTP protection profile was negotiated")]
    NoSrtpProtectionProfile,
    #[error("remote did not present a certificate")]
    NoRemoteCertificate,
    #[error("no certificate configured")]
    NoCertificate,
    #[error("offered profile list must not be empty")]
    NoOfferedProfiles,

    #[error("packet is neither DTLS nor RTP/RTCP")]
    UnhandledPacketType,

    #[error("invalid crypto attribute: {0}")]
    InvalidCryptoAttribute(String),
    #[error("no matching SDES crypto suite")]
    NoMatchingCryptoSuite,

    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("{0}")]
    Io(#[source] IoError),
    #[error("keying material: {0}")]
    KeyingMaterial(#[from] util::KeyingMaterialExporterError),
    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Dtls(#[from] dtls::Error),

    #[error("{0}")]
    Other(String),
}

/// Typed handshake failure, mapped to a stable string tag only at the
/// public boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,
    #[error("fatal alert: {0}")]
    FatalAlert(AlertDescription),
    #[error("transport disconnected")]
    Disconnected,
    #[error("{0}")]
    Protocol(String),
}

impl HandshakeError {
    pub fn tag(&self) -> String {
        match self {
            HandshakeError::Timeout => "timeout".to_owned(),
            HandshakeError::FatalAlert(description) => description.to_string(),
            HandshakeError::Disconnected => "disconnected".to_owned(),
            HandshakeError::Protocol(_) => "unknown".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
