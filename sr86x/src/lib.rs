//! SR86x lock-in amplifier streaming capture
//!
//! This library controls an SR86x over VXI-11 and captures the telemetry it
//! streams over UDP.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `sr86x-core`: Error type and protocol constants
//! - `sr86x-xdr`: XDR encoding/decoding
//! - `sr86x-transport`: Transport layer (TCP stream, UDP datagrams)
//! - `sr86x-rpc`: ONC RPC record marking, headers and server call engine
//! - `sr86x-vxi11`: VXI-11 client
//! - `sr86x-telemetry`: UDP packet decoding and capture sinks
//!
//! # Usage
//!
//! ```no_run
//! use sr86x::stream::InstrumentStream;
//! use sr86x::transport::TcpTransportFactory;
//! use sr86x::vxi11::Vxi11ClientBuilder;
//!
//! # async fn run() -> sr86x::Sr86xResult<()> {
//! let factory = TcpTransportFactory::new("192.168.1.50".parse().unwrap());
//! let mut instrument = InstrumentStream::new(Vxi11ClientBuilder::new().build(factory));
//! let id = instrument.connect(None).await?;
//! instrument.set_streaming(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod stream;

// Re-export core types
pub use sr86x_core::{ReplyError, Sr86xError, Sr86xResult, XdrError};

pub mod constants {
    pub use sr86x_core::constants::*;
}

pub mod xdr {
    pub use sr86x_xdr::*;
}

pub mod transport {
    pub use sr86x_transport::*;
}

pub mod rpc {
    pub use sr86x_rpc::*;
}

pub mod vxi11 {
    pub use sr86x_vxi11::*;
}

pub mod telemetry {
    pub use sr86x_telemetry::*;
}

pub use stream::{InstrumentStream, StreamSettings, choose_packet_size, format_rate};
pub use sr86x_telemetry::SinkFormat;
