//! Telemetry receive loop
//!
//! One tokio task per bound port receives datagrams and hands them to the
//! shared [`CaptureSession`]; decoding and persistence happen on that task.

use crate::config::TelemetryConfig;
use crate::session::{CaptureSession, TelemetryStatus};
use sr86x_core::{Sr86xError, Sr86xResult};
use sr86x_transport::{DatagramSource, UdpReceiver, UdpSettings};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receive datagrams from `source` until `shutdown` fires
pub async fn run_receiver<D: DatagramSource>(
    mut source: D,
    session: Arc<CaptureSession>,
    config: TelemetryConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; config.buffer_size];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = source.recv(&mut buffer) => match received {
                Ok(len) => session.process_datagram(&mut buffer[..len]),
                Err(Sr86xError::Timeout) => {}
                Err(e) => {
                    log::debug!("Telemetry receive failed: {}", e);
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
    log::debug!("Telemetry receiver stopped");
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    port: Option<u16>,
}

/// UDP telemetry server
///
/// # Usage Example
/// ```rust,no_run
/// use sr86x_telemetry::{TelemetryConfig, TelemetryServer};
///
/// # async fn run() -> sr86x_core::Sr86xResult<()> {
/// let mut server = TelemetryServer::new(TelemetryConfig::default());
/// server.start().await?;
/// server.set_port(1866).await?;
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct TelemetryServer {
    config: TelemetryConfig,
    session: Arc<CaptureSession>,
    running: Option<Running>,
}

impl TelemetryServer {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            session: Arc::new(CaptureSession::new()),
            running: None,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Shared capture state, also used to open and close sinks
    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Port actually bound, if running
    pub fn local_port(&self) -> Option<u16> {
        self.running.as_ref().and_then(|r| r.port)
    }

    /// Bind the configured port and start receiving
    ///
    /// A running receiver is stopped first.
    pub async fn start(&mut self) -> Sr86xResult<()> {
        self.stop().await;

        let receiver = UdpReceiver::bind(UdpSettings::new(self.config.port))
            .await
            .map_err(|e| {
                log::warn!("Could not bind UDP port {}: {}", self.config.port, e);
                e
            })?;
        let port = receiver.local_port();
        log::info!("Telemetry listening on UDP port {:?}", port);
        self.spawn(receiver, port);
        Ok(())
    }

    /// Start receiving from an already bound source
    pub async fn start_with<D: DatagramSource + 'static>(&mut self, source: D) {
        self.stop().await;
        let port = source.local_port();
        self.spawn(source, port);
    }

    fn spawn<D: DatagramSource + 'static>(&mut self, source: D, port: Option<u16>) {
        let (shutdown, rx) = watch::channel(false);
        self.session.restart_sequence();
        let handle = tokio::spawn(run_receiver(
            source,
            self.session.clone(),
            self.config.clone(),
            rx,
        ));
        self.running = Some(Running {
            shutdown,
            handle,
            port,
        });
    }

    /// Restart the receiver on a new port
    pub async fn set_port(&mut self, port: u16) -> Sr86xResult<()> {
        self.stop().await;
        self.config.port = port;
        self.start().await
    }

    /// Stop the receive loop and wait for it to finish
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            if let Err(e) = running.handle.await {
                log::warn!("Telemetry receiver task failed: {}", e);
            }
        }
    }

    /// Latest sample and counters, resetting the counters
    pub fn take_status(&self) -> TelemetryStatus {
        self.session.take_status()
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            running.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    struct ChannelSource {
        rx: mpsc::Receiver<Vec<u8>>,
    }

    #[async_trait]
    impl DatagramSource for ChannelSource {
        async fn recv(&mut self, buf: &mut [u8]) -> Sr86xResult<usize> {
            match self.rx.recv().await {
                Some(datagram) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    Ok(n)
                }
                None => Err(Sr86xError::Connection(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "closed",
                ))),
            }
        }

        fn local_port(&self) -> Option<u16> {
            None
        }
    }

    fn packet(counter: u8) -> Vec<u8> {
        let mut p = (0x0000_3000 | u32::from(counter)).to_be_bytes().to_vec();
        p.extend_from_slice(&1.0f32.to_be_bytes());
        p
    }

    /// Poll until `bytes` have been counted, accumulating across status reads
    async fn wait_for_bytes(server: &TelemetryServer, bytes: usize) -> TelemetryStatus {
        let mut total = TelemetryStatus::default();
        for _ in 0..200 {
            let status = server.take_status();
            total.bytes += status.bytes;
            total.missed |= status.missed;
            total.samples = status.samples;
            if total.bytes >= bytes {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        total
    }

    #[tokio::test]
    async fn test_channel_source_feeds_session() {
        let (tx, rx) = mpsc::channel(8);
        let mut server = TelemetryServer::new(TelemetryConfig::default());
        server.start_with(ChannelSource { rx }).await;
        assert!(server.is_running());

        for counter in [1, 2, 4] {
            tx.send(packet(counter)).await.unwrap();
        }
        let status = wait_for_bytes(&server, 24).await;
        assert_eq!(status.bytes, 24);
        assert!(status.missed);
        assert_eq!(status.samples.x, 1.0);

        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_oversize_datagram_truncated() {
        let (tx, rx) = mpsc::channel(8);
        let mut server = TelemetryServer::new(TelemetryConfig::default());
        server.start_with(ChannelSource { rx }).await;

        let mut big = packet(0);
        big.resize(1500, 0);
        tx.send(big).await.unwrap();
        assert_eq!(wait_for_bytes(&server, 1200).await.bytes, 1200);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_udp_receive_and_set_port() {
        let mut server = TelemetryServer::new(TelemetryConfig::default().with_port(0));
        server.start().await.unwrap();
        let port = server.local_port().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&packet(7), ("127.0.0.1", port)).await.unwrap();
        assert_eq!(wait_for_bytes(&server, 8).await.bytes, 8);

        server.set_port(0).await.unwrap();
        let port = server.local_port().unwrap();
        sender.send_to(&packet(9), ("127.0.0.1", port)).await.unwrap();
        let status = wait_for_bytes(&server, 8).await;
        assert_eq!(status.bytes, 8);
        // new receiver starts a fresh counter sequence
        assert!(!status.missed);

        server.stop().await;
    }
}
