#[cfg(test)]
mod transport_test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use dtls::conn::DTLSConn;
use tokio::sync::Mutex;
use tokio::time::Instant;
use util::{Conn, KeyingMaterialExporter};

use crate::alert::{Alert, AlertDescription, AlertLevel, OnAlertHdlrFn};
use crate::certificate::Certificate;
use crate::config::Config;
use crate::endpoint::{Endpoint, OnDataReadyHdlrFn};
use crate::error::{Error, HandshakeError, Result};
use crate::mux;
use crate::peer::{profile_from_wire, DtlsRole, DtlsSrtpPeer, SrtpKeyingMaterial};
use crate::srtp::context::Context;
use crate::srtp::option::*;
use crate::srtp::protection_profile::ProtectionProfile;

const LABEL_EXTRACTOR_DTLS_SRTP: &str = "EXTRACTOR-dtls_srtp";

const DEFAULT_SRTP_REPLAY_PROTECTION_WINDOW: usize = 64;
const DEFAULT_SRTCP_REPLAY_PROTECTION_WINDOW: usize = 64;

/// DtlsSrtpTransport drives a DTLS handshake in the configured role over an
/// [`Endpoint`] it owns, derives the SRTP session keys from the DTLS keying
/// material, and protects/unprotects RTP and RTCP packets afterwards.
///
/// Lifecycle is one-way: Idle -> Handshaking -> (Complete | Failed). A
/// failed transport is not retried; construct a new one.
pub struct DtlsSrtpTransport {
    config: Config,
    endpoint: Arc<Endpoint>,
    peer: Mutex<DtlsSrtpPeer>,
    conn: Mutex<Option<DTLSConn>>,

    // The encoder and decoder are locked separately so sending never
    // contends with receiving.
    srtp_outbound: Mutex<Option<Context>>,
    srtp_inbound: Mutex<Option<Context>>,

    handshaking: AtomicBool,
    handshake_complete: AtomicBool,
    handshake_failed: AtomicBool,

    on_alert_handler: Arc<ArcSwapOption<Mutex<OnAlertHdlrFn>>>,
}

impl DtlsSrtpTransport {
    pub fn new(role: DtlsRole, config: Config) -> Result<Self> {
        let certificate = match &config.certificate {
            Some(certificate) => certificate.clone(),
            None => Certificate::generate_self_signed()?,
        };

        let peer = DtlsSrtpPeer::new(role, certificate, config.offered_profiles.clone())?;
        let endpoint = Arc::new(Endpoint::new(
            config.retransmission_interval,
            config.receive_limit(),
            config.send_limit(),
        ));

        Ok(DtlsSrtpTransport {
            config,
            endpoint,
            peer: Mutex::new(peer),
            conn: Mutex::new(None),
            srtp_outbound: Mutex::new(None),
            srtp_inbound: Mutex::new(None),
            handshaking: AtomicBool::new(false),
            handshake_complete: AtomicBool::new(false),
            handshake_failed: AtomicBool::new(false),
            on_alert_handler: Arc::new(ArcSwapOption::empty()),
        })
    }

    /// on_data_ready sets the handler invoked with every outbound datagram.
    /// Must be registered before `do_handshake`.
    pub fn on_data_ready(&self, f: OnDataReadyHdlrFn) {
        self.endpoint.on_data_ready(f);
    }

    /// on_alert sets the handler receiving every alert the transport raises
    /// or classifies.
    pub fn on_alert(&self, f: OnAlertHdlrFn) {
        self.on_alert_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Feeds an inbound UDP payload to the transport. Only DTLS records are
    /// admitted to the engine queue (RFC 7983 first-byte classification);
    /// protected media belongs in [`DtlsSrtpTransport::unprotect`] and
    /// anything else is rejected.
    pub async fn write_to_recv_stream(&self, data: &[u8]) -> Result<usize> {
        if !mux::match_dtls(data) {
            return Err(Error::UnhandledPacketType);
        }

        let n = self.endpoint.write_to_recv_stream(data).await?;
        if n == 0 {
            // The endpoint dropped the record (oversized or queue full).
            // During the handshake that starves the engine of flights, so
            // tell the listeners instead of leaving only the overall
            // deadline, which cannot tell this apart from a dead peer.
            self.raise_alert(Alert {
                level: AlertLevel::Warning,
                description: AlertDescription::RecordOverflow,
            })
            .await;
        }
        Ok(n)
    }

    /// Runs the DTLS handshake to completion in the configured role.
    /// Idempotent once complete; concurrent invocation is rejected. On
    /// failure the typed error carries the boundary tag
    /// (`"timeout"`, the alert description, `"disconnected"`, `"unknown"`).
    pub async fn do_handshake(&self) -> Result<()> {
        if self.handshake_complete.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.handshaking.swap(true, Ordering::SeqCst) {
            return Err(Error::HandshakeInProgress);
        }
        if self.handshake_failed.load(Ordering::SeqCst) {
            self.handshaking.store(false, Ordering::SeqCst);
            return Err(Error::Handshake(HandshakeError::Protocol(
                "handshake already failed".to_owned(),
            )));
        }

        let result = self.handshake_inner().await;
        self.handshaking.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.handshake_complete.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.handshake_failed.store(true, Ordering::SeqCst);
                if let HandshakeError::FatalAlert(description) = &err {
                    self.raise_alert(Alert {
                        level: AlertLevel::Fatal,
                        description: *description,
                    })
                    .await;
                }
                log::warn!("dtls handshake failed: {err}");
                // Release the queue so any engine task left behind by the
                // aborted handshake unblocks and exits.
                self.endpoint.close_endpoint().await;
                Err(err.into())
            }
        }
    }

    async fn handshake_inner(&self) -> std::result::Result<(), HandshakeError> {
        let deadline = Instant::now() + self.config.handshake_timeout;
        self.endpoint.begin_handshake(deadline).await;

        let (is_client, dtls_config) = {
            let peer = self.peer.lock().await;
            (
                peer.role() == DtlsRole::Client,
                peer.dtls_config(&self.config),
            )
        };

        let conn_result = tokio::time::timeout(
            self.config.handshake_timeout,
            DTLSConn::new(
                Arc::clone(&self.endpoint) as Arc<dyn Conn + Send + Sync>,
                dtls_config,
                is_client,
                None,
            ),
        )
        .await;

        let conn = match conn_result {
            Err(_) => return Err(HandshakeError::Timeout),
            Ok(Err(err)) => return Err(classify_dtls_error(err)),
            Ok(Ok(conn)) => conn,
        };

        let profile = profile_from_wire(conn.selected_srtpprotection_profile())
            .map_err(|err| HandshakeError::Protocol(err.to_string()))?;

        let state = conn.connection_state().await;
        let remote_certificates = state.peer_certificates.clone();
        if remote_certificates.is_empty() {
            return Err(HandshakeError::Protocol(
                Error::NoRemoteCertificate.to_string(),
            ));
        }

        let keying_material = state
            .export_keying_material(LABEL_EXTRACTOR_DTLS_SRTP, &[], profile.keying_material_len())
            .await
            .map_err(|err| HandshakeError::Protocol(err.to_string()))?;
        let keys = SrtpKeyingMaterial::partition(profile, &keying_material)
            .map_err(|err| HandshakeError::Protocol(err.to_string()))?;

        {
            let mut peer = self.peer.lock().await;
            peer.install(profile, keys, remote_certificates);

            let stream_keys = peer
                .stream_keys()
                .map_err(|err| HandshakeError::Protocol(err.to_string()))?;

            let outbound = Context::new(
                &stream_keys.local_master_key,
                &stream_keys.local_master_salt,
                profile,
                Some(srtp_no_replay_protection()),
                Some(srtcp_no_replay_protection()),
            )
            .map_err(|err| HandshakeError::Protocol(err.to_string()))?;

            let inbound = Context::new(
                &stream_keys.remote_master_key,
                &stream_keys.remote_master_salt,
                profile,
                Some(srtp_replay_protection(
                    DEFAULT_SRTP_REPLAY_PROTECTION_WINDOW,
                )),
                Some(srtcp_replay_protection(
                    DEFAULT_SRTCP_REPLAY_PROTECTION_WINDOW,
                )),
            )
            .map_err(|err| HandshakeError::Protocol(err.to_string()))?;

            *self.srtp_outbound.lock().await = Some(outbound);
            *self.srtp_inbound.lock().await = Some(inbound);

            log::info!(
                "dtls-srtp handshake complete: profile {profile}, local fingerprint {}",
                peer.fingerprint()
            );
        }

        self.endpoint.set_handshake_complete();
        *self.conn.lock().await = Some(conn);

        Ok(())
    }

    async fn raise_alert(&self, alert: Alert) {
        if alert.level == AlertLevel::Warning {
            log::warn!("{alert}");
        }
        let handler = self.on_alert_handler.load();
        if let Some(handler) = &*handler {
            let mut f = handler.lock().await;
            f(alert).await;
        }
    }

    pub fn handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::SeqCst)
    }

    /// Protects a marshalled RTP packet, appending the auth tag.
    pub async fn protect_rtp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.ensure_ready()?;
        let mut outbound = self.srtp_outbound.lock().await;
        let ctx = outbound.as_mut().ok_or(Error::HandshakeNotComplete)?;
        ctx.encrypt_rtp(pkt)
    }

    /// Unprotects an inbound SRTP packet. Replay and authentication
    /// failures surface as typed errors; the session stays up.
    pub async fn unprotect_rtp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.ensure_ready()?;
        let mut inbound = self.srtp_inbound.lock().await;
        let ctx = inbound.as_mut().ok_or(Error::HandshakeNotComplete)?;
        ctx.decrypt_rtp(pkt)
    }

    pub async fn protect_rtcp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.ensure_ready()?;
        let mut outbound = self.srtp_outbound.lock().await;
        let ctx = outbound.as_mut().ok_or(Error::HandshakeNotComplete)?;
        ctx.encrypt_rtcp(pkt)
    }

    pub async fn unprotect_rtcp(&self, pkt: &[u8]) -> Result<Bytes> {
        self.ensure_ready()?;
        let mut inbound = self.srtp_inbound.lock().await;
        let ctx = inbound.as_mut().ok_or(Error::HandshakeNotComplete)?;
        ctx.decrypt_rtcp(pkt)
    }

    /// Routes a protected inbound media packet to the matching context,
    /// telling SRTCP apart from SRTP by the packet type range when both
    /// ride one transport (RFC 5761).
    pub async fn unprotect(&self, pkt: &[u8]) -> Result<Bytes> {
        if mux::match_srtcp(pkt) {
            self.unprotect_rtcp(pkt).await
        } else if mux::match_srtp(pkt) {
            self.unprotect_rtp(pkt).await
        } else {
            Err(Error::UnhandledPacketType)
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.endpoint.is_closed() {
            return Err(Error::TransportClosed);
        }
        if !self.handshake_complete.load(Ordering::SeqCst) {
            return Err(Error::HandshakeNotComplete);
        }
        Ok(())
    }

    /// The negotiated profile, set once after the use_srtp exchange.
    pub async fn negotiated_profile(&self) -> Option<ProtectionProfile> {
        self.peer.lock().await.negotiated_profile()
    }

    /// The exporter output partition; for loopback peers both sides hold
    /// byte-identical halves.
    pub async fn keying_material(&self) -> Option<SrtpKeyingMaterial> {
        self.peer.lock().await.keying_material().cloned()
    }

    /// The remote certificate chain in DER form, leaf first. Empty before
    /// handshake completion.
    pub async fn remote_certificates(&self) -> Vec<Vec<u8>> {
        self.peer.lock().await.remote_certificates().to_vec()
    }

    /// The local leaf certificate fingerprint, `"sha-256 "` + uppercase
    /// colon-separated hex.
    pub async fn fingerprint(&self) -> String {
        self.peer.lock().await.fingerprint().to_owned()
    }

    pub async fn role(&self) -> DtlsRole {
        self.peer.lock().await.role()
    }

    /// Closes the endpoint and the DTLS transport. Pending reads return a
    /// disconnected error; a double close is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.endpoint.close_endpoint().await;

        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            match conn.close().await {
                Ok(_) => {}
                Err(err) => {
                    // the dtls connection may already be closed by the peer
                    if err != dtls::Error::ErrConnClosed {
                        return Err(err.into());
                    }
                }
            }
        }

        Ok(())
    }
}

fn classify_dtls_error(err: dtls::Error) -> HandshakeError {
    use dtls::Error as DtlsError;

    match &err {
        DtlsError::Util(util::Error::ErrTimeout) => HandshakeError::Timeout,
        DtlsError::Util(util::Error::ErrBufferClosed) => HandshakeError::Disconnected,
        DtlsError::ErrConnClosed => HandshakeError::Disconnected,
        _ => match Alert::from_dtls_error(&err) {
            Some(alert) => HandshakeError::FatalAlert(alert.description),
            None => HandshakeError::Protocol(err.to_string()),
        },
    }
}
