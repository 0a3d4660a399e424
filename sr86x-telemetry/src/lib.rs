//! SR86x streaming telemetry
//!
//! The instrument streams lock-in samples as UDP datagrams: one big-endian
//! header word followed by a float or 16-bit integer payload. This crate
//! decodes those packets, detects dropped packets from the 8-bit counter,
//! keeps a snapshot of the latest sample for display and persists every
//! packet to a binary or CSV sink.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use sr86x_telemetry::{CaptureSink, SinkFormat, TelemetryConfig, TelemetryServer};
//!
//! # async fn run() -> sr86x_core::Sr86xResult<()> {
//! let mut server = TelemetryServer::new(TelemetryConfig::default());
//! let format = SinkFormat::from_path("capture.csv")?;
//! server.session().open_sink(CaptureSink::create("capture.csv", format, true)?);
//! server.start().await?;
//! let status = server.take_status();
//! println!("{} bytes, missed={}", status.bytes, status.missed);
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod header;
pub mod packet;
pub mod server;
pub mod session;
pub mod sink;

pub use config::TelemetryConfig;
pub use header::PacketHeader;
pub use packet::{Samples, to_host_order};
pub use server::{TelemetryServer, run_receiver};
pub use session::{CaptureSession, TelemetryStatus};
pub use sink::{CaptureSink, SinkFormat};

/// Default UDP port the instrument streams to
pub const DEFAULT_STREAM_PORT: u16 = 1865;

/// Receive buffer size; the largest packet is a 4-byte header plus 1024 bytes
pub const RECEIVE_BUFFER_SIZE: usize = 1200;
