//! TCP transport implementation

use crate::stream::{StreamAccessor, TransportFactory, TransportLayer};
use async_trait::async_trait;
use sr86x_core::{Sr86xError, Sr86xResult};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default timeout for connect, read and write
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.peer_addr() {
            Ok(peer) => f.debug_struct("TcpStream").field("peer", &peer).finish(),
            Err(_) => f.debug_struct("TcpStream").finish(),
        }
    }
}

impl Deref for DebugTcpStream {
    type Target = TcpStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugTcpStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

fn not_connected() -> Sr86xError {
    Sr86xError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "TCP stream not connected",
    ))
}

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(DEFAULT_TCP_TIMEOUT),
        }
    }

    /// Create TCP settings with timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout: Some(timeout),
        }
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create TCP transport from address string
    pub fn from_address(address: &str) -> Sr86xResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| Sr86xError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    /// Wrap an already-connected TcpStream (for server use)
    pub fn from_connected_stream(stream: TcpStream, timeout: Option<Duration>) -> Self {
        let address = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0));
        Self {
            stream: Some(DebugTcpStream(stream)),
            settings: TcpSettings { address, timeout },
            closed: false,
        }
    }

    /// Remote address
    pub fn address(&self) -> SocketAddr {
        self.settings.address
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> Sr86xResult<()> {
        if !self.closed {
            return Err(Sr86xError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = match self.settings.timeout {
            Some(timeout) => {
                tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                    .await
                    .map_err(|_| Sr86xError::Timeout)??
            }
            None => TcpStream::connect(self.settings.address).await?,
        };
        // Calls are small request/reply records
        stream.set_nodelay(true)?;

        log::debug!("TCP connected to {}", self.settings.address);
        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> Sr86xResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Sr86xResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let result = match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| Sr86xError::Timeout)
                .and_then(|r| r.map_err(Sr86xError::Connection)),
            None => stream.read(buf).await.map_err(Sr86xError::Connection),
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> Sr86xResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| Sr86xError::Timeout)?
                .map_err(Sr86xError::Connection),
            None => stream.write(buf).await.map_err(Sr86xError::Connection),
        }
    }

    async fn flush(&mut self) -> Sr86xResult<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.flush().await.map_err(Sr86xError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Sr86xResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}

/// Makes TCP transports to one instrument host
#[derive(Debug, Clone)]
pub struct TcpTransportFactory {
    host: IpAddr,
    timeout: Option<Duration>,
}

impl TcpTransportFactory {
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            timeout: Some(DEFAULT_TCP_TIMEOUT),
        }
    }

    /// Set the timeout applied to every transport this factory creates
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }
}

impl TransportFactory for TcpTransportFactory {
    type Transport = TcpTransport;

    fn create(&self, port: u16) -> Sr86xResult<TcpTransport> {
        Ok(TcpTransport::new(TcpSettings {
            address: SocketAddr::new(self.host, port),
            timeout: self.timeout,
        }))
    }
}
