use std::time::Duration;

use crate::certificate::Certificate;
use crate::srtp::protection_profile::ProtectionProfile;

pub(crate) const DEFAULT_MTU: usize = 1500; // bytes
pub(crate) const MIN_IP_HEADER_SIZE: usize = 20;
pub(crate) const MAX_IP_HEADER_SIZE: usize = 84; // incl. options
pub(crate) const UDP_HEADER_SIZE: usize = 8;

pub(crate) const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(20_000);
pub(crate) const DEFAULT_RETRANSMISSION_WAIT: Duration = Duration::from_millis(100);
pub(crate) const MAX_RETRANSMISSION_WAIT: Duration = Duration::from_millis(6_000);

/// Config is used to configure a DTLS-SRTP transport.
/// After a Config is passed to a transport it must not be modified.
pub struct Config {
    /// Path MTU, used to size the receive and send limits.
    pub mtu: usize,

    /// Overall handshake deadline. `do_handshake` fails with a timeout once
    /// this much time has elapsed without completion.
    pub handshake_timeout: Duration,

    /// Base wait between handshake retransmissions. The transport doubles it
    /// on every empty receive slice up to a 6 second cap.
    pub retransmission_interval: Duration,

    /// Require the Extended Master Secret extension (RFC 7627). When set the
    /// handshake itself fails if the remote does not negotiate EMS, so keying
    /// material is never exported from an unbound session.
    pub require_extended_master_secret: bool,

    /// SRTP protection profiles offered in the use_srtp extension, in
    /// preference order. Must not be empty.
    pub offered_profiles: Vec<ProtectionProfile>,

    /// Local certificate chain and private key. A self-signed ECDSA P-256
    /// certificate is generated when unset.
    pub certificate: Option<Certificate>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mtu: DEFAULT_MTU,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            retransmission_interval: DEFAULT_RETRANSMISSION_WAIT,
            require_extended_master_secret: true,
            offered_profiles: vec![
                ProtectionProfile::Aes128CmHmacSha1_80,
                ProtectionProfile::Aes128CmHmacSha1_32,
            ],
            certificate: None,
        }
    }
}

impl Config {
    /// Largest datagram accepted from the wire.
    pub(crate) fn receive_limit(&self) -> usize {
        self.mtu - MIN_IP_HEADER_SIZE - UDP_HEADER_SIZE
    }

    /// Largest datagram handed to the wire; also the fragmentation MTU of
    /// the DTLS record layer.
    pub(crate) fn send_limit(&self) -> usize {
        self.mtu - MAX_IP_HEADER_SIZE - UDP_HEADER_SIZE
    }
}
