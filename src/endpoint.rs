use std::cmp;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use util::{Buffer, Conn};

use crate::config::MAX_RETRANSMISSION_WAIT;
use crate::error::{Error, Result};

pub type OnDataReadyHdlrFn =
    Box<dyn (FnMut(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

type UtilResult<T> = std::result::Result<T, util::Error>;

/// Endpoint bridges two mismatched interfaces: the host pushes inbound
/// datagrams from its network task and registers a callback for outbound
/// bytes, while the DTLS engine expects a blocking datagram [`Conn`].
///
/// Inbound packets land in a bounded packet queue. During the handshake the
/// engine's reads wait on the queue in bounded slices, doubling on every
/// empty slice (with a small random jitter so two LAN peers do not retry in
/// lockstep) and bounded by the overall handshake deadline. Outbound bytes
/// are handed to the `on_data_ready` handler synchronously.
pub struct Endpoint {
    recv_buffer: Buffer,
    on_data_ready_handler: Arc<ArcSwapOption<Mutex<OnDataReadyHdlrFn>>>,

    handshake_complete: AtomicBool,
    closed: AtomicBool,

    handshake_deadline: Mutex<Option<Instant>>,
    retransmission_wait: Mutex<Duration>,
    base_wait: Duration,

    receive_limit: usize,
    send_limit: usize,
}

impl Endpoint {
    pub(crate) fn new(base_wait: Duration, receive_limit: usize, send_limit: usize) -> Self {
        Endpoint {
            recv_buffer: Buffer::new(0, 0),
            on_data_ready_handler: Arc::new(ArcSwapOption::empty()),
            handshake_complete: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handshake_deadline: Mutex::new(None),
            retransmission_wait: Mutex::new(base_wait),
            base_wait,
            receive_limit,
            send_limit,
        }
    }

    /// on_data_ready sets the handler invoked whenever outbound DTLS or
    /// SRTP bytes must go on the wire.
    pub fn on_data_ready(&self, f: OnDataReadyHdlrFn) {
        self.on_data_ready_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Enqueues an inbound datagram from the network task. Never blocks on
    /// the handshake task; a full queue drops the datagram.
    pub async fn write_to_recv_stream(&self, data: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportClosed);
        }
        if data.len() > self.receive_limit {
            log::warn!(
                "inbound datagram of {} bytes exceeds receive limit {}, dropping",
                data.len(),
                self.receive_limit
            );
            return Ok(0);
        }

        match self.recv_buffer.write(data).await {
            Ok(n) => Ok(n),
            Err(err) => {
                if util::Error::ErrBufferFull == err {
                    log::trace!("inbound queue full, dropping datagram");
                    Ok(0)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Arms the overall handshake deadline and resets the backoff.
    pub(crate) async fn begin_handshake(&self, deadline: Instant) {
        {
            let mut d = self.handshake_deadline.lock().await;
            *d = Some(deadline);
        }
        let mut wait = self.retransmission_wait.lock().await;
        *wait = self.base_wait;
    }

    /// After completion reads block until data or close, without a deadline.
    pub(crate) fn set_handshake_complete(&self) {
        self.handshake_complete.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the endpoint closed and wakes any blocked read. A double close
    /// is a no-op.
    pub async fn close_endpoint(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.recv_buffer.close().await;
    }
}

#[async_trait]
impl Conn for Endpoint {
    async fn connect(&self, _addr: SocketAddr) -> UtilResult<()> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    /// Reads the next inbound datagram for the DTLS engine. Bounded waits
    /// with exponential backoff while the handshake is in flight; the
    /// overall deadline surfaces as a timeout error.
    async fn recv(&self, buf: &mut [u8]) -> UtilResult<usize> {
        loop {
            let handshake_complete = self.handshake_complete.load(Ordering::SeqCst);

            let wait = if handshake_complete {
                None
            } else {
                let deadline = { *self.handshake_deadline.lock().await };
                match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(util::Error::ErrTimeout);
                        }
                        let current = { *self.retransmission_wait.lock().await };
                        let jitter =
                            Duration::from_millis(rand::rng().random_range(5..=25));
                        Some(cmp::min(current + jitter, deadline - now))
                    }
                    // Handshake not armed yet; poll in base slices.
                    None => Some(self.base_wait),
                }
            };

            match self.recv_buffer.read(buf, wait).await {
                Ok(n) => {
                    if !handshake_complete {
                        let mut wait = self.retransmission_wait.lock().await;
                        *wait = self.base_wait;
                    }
                    return Ok(n);
                }
                Err(err) => {
                    if util::Error::ErrTimeout == err {
                        let mut wait = self.retransmission_wait.lock().await;
                        *wait = cmp::min(*wait * 2, MAX_RETRANSMISSION_WAIT);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn recv_from(&self, _buf: &mut [u8]) -> UtilResult<(usize, SocketAddr)> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    /// Hands outbound bytes to the registered on_data_ready handler with an
    /// owned copy; the handler must not be blocked on by its consumer.
    async fn send(&self, buf: &[u8]) -> UtilResult<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(util::Error::ErrBufferClosed);
        }
        if buf.len() > self.send_limit {
            log::warn!(
                "outbound datagram of {} bytes exceeds send limit {}",
                buf.len(),
                self.send_limit
            );
        }

        let handler = self.on_data_ready_handler.load();
        if let Some(handler) = &*handler {
            let mut f = handler.lock().await;
            f(Bytes::copy_from_slice(buf)).await;
        } else {
            log::debug!("no on_data_ready handler, {} bytes dropped", buf.len());
        }

        Ok(buf.len())
    }

    async fn send_to(&self, _buf: &[u8], _target: SocketAddr) -> UtilResult<usize> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    fn local_addr(&self) -> UtilResult<SocketAddr> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) -> UtilResult<()> {
        self.close_endpoint().await;
        Ok(())
    }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}

#[cfg(test)]
mod endpoint_test {
    use super::*;

    #[tokio::test]
    async fn test_write_then_recv() -> Result<()> {
        let endpoint = Endpoint::new(Duration::from_millis(50), 1472, 1408);

        endpoint.write_to_recv_stream(&[1, 2, 3]).await?;

        let mut buf = vec![0u8; 1500];
        let n = endpoint.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_datagram_boundaries_preserved() -> Result<()> {
        let endpoint = Endpoint::new(Duration::from_millis(50), 1472, 1408);

        endpoint.write_to_recv_stream(&[1, 2]).await?;
        endpoint.write_to_recv_stream(&[3]).await?;

        let mut buf = vec![0u8; 1500];
        assert_eq!(endpoint.recv(&mut buf).await.unwrap(), 2);
        assert_eq!(endpoint.recv(&mut buf).await.unwrap(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_recv_times_out_at_deadline() {
        let endpoint = Endpoint::new(Duration::from_millis(20), 1472, 1408);
        endpoint
            .begin_handshake(Instant::now() + Duration::from_millis(150))
            .await;

        let started = Instant::now();
        let mut buf = vec![0u8; 1500];
        let err = endpoint.recv(&mut buf).await.unwrap_err();
        assert_eq!(err, util::Error::ErrTimeout);

        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(140) && elapsed < Duration::from_millis(500),
            "deadline fired after {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_oversized_inbound_dropped() -> Result<()> {
        let endpoint = Endpoint::new(Duration::from_millis(20), 10, 10);
        assert_eq!(endpoint.write_to_recv_stream(&[0u8; 11]).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_recv_after_close_fails() {
        let endpoint = Endpoint::new(Duration::from_millis(20), 1472, 1408);
        endpoint.close_endpoint().await;
        // double close is a no-op
        endpoint.close_endpoint().await;

        let mut buf = vec![0u8; 1500];
        let err = endpoint.recv(&mut buf).await.unwrap_err();
        assert_eq!(err, util::Error::ErrBufferClosed);

        assert!(endpoint.write_to_recv_stream(&[1]).await.is_err());
    }
}
