//! UDP datagram receiver

use crate::stream::DatagramSource;
use async_trait::async_trait;
use sr86x_core::{Sr86xError, Sr86xResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Maximum UDP payload size
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507;

/// UDP receiver settings
#[derive(Debug, Clone)]
pub struct UdpSettings {
    pub bind_address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl UdpSettings {
    /// Listen on `port` on every interface, without a receive timeout
    pub fn new(port: u16) -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            timeout: None,
        }
    }

    /// Create UDP settings with a receive timeout
    pub fn with_timeout(bind_address: SocketAddr, timeout: Duration) -> Self {
        Self {
            bind_address,
            timeout: Some(timeout),
        }
    }
}

/// Bound UDP socket delivering whole datagrams
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    settings: UdpSettings,
}

impl UdpReceiver {
    /// Bind a socket according to `settings`
    pub async fn bind(settings: UdpSettings) -> Sr86xResult<Self> {
        let socket = UdpSocket::bind(settings.bind_address).await?;
        log::debug!("UDP bound to {:?}", socket.local_addr().ok());
        Ok(Self { socket, settings })
    }

    pub fn local_addr(&self) -> Sr86xResult<SocketAddr> {
        self.socket.local_addr().map_err(Sr86xError::Connection)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.settings.timeout = timeout;
    }
}

#[async_trait]
impl DatagramSource for UdpReceiver {
    async fn recv(&mut self, buf: &mut [u8]) -> Sr86xResult<usize> {
        let (len, _from) = match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.socket.recv_from(buf))
                .await
                .map_err(|_| Sr86xError::Timeout)??,
            None => self.socket.recv_from(buf).await?,
        };
        Ok(len)
    }

    fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().ok().map(|addr| addr.port())
    }
}
