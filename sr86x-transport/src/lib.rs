//! Transport layer for SR86x instrument control
//!
//! This crate provides the byte-stream traits the RPC and VXI-11 layers run
//! over, plus tokio adapters for TCP (control channel) and UDP (telemetry).

pub mod stream;
pub mod tcp;
pub mod udp;

pub use sr86x_core::{Sr86xError, Sr86xResult};
pub use stream::{DatagramSource, StreamAccessor, TransportFactory, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport, TcpTransportFactory};
pub use udp::{UdpReceiver, UdpSettings, MAX_UDP_PAYLOAD_SIZE};
