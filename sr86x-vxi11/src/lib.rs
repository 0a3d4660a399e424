//! VXI-11 client for SR86x instruments
//!
//! This crate talks to the instrument's VXI-11 core channel: it resolves the
//! core port through the portmapper, creates a device link and then issues
//! write/read/status/lock calls over it, one request/reply record at a time.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use sr86x_transport::TcpTransportFactory;
//! use sr86x_vxi11::Vxi11ClientBuilder;
//!
//! # async fn run() -> sr86x_core::Sr86xResult<()> {
//! let factory = TcpTransportFactory::new("192.168.1.50".parse().unwrap());
//! let mut client = Vxi11ClientBuilder::new().build(factory);
//! client.connect_to_device(None, false).await?;
//! client.device_write("*IDN?").await?;
//! let id = client.device_read().await?;
//! client.destroy_link().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error_code;
pub mod response;

pub use builder::Vxi11ClientBuilder;
pub use client::{ConnectPhase, StatusCallback, Vxi11Client};
pub use config::Vxi11Config;
pub use error_code::device_error_message;
pub use response::DeviceResponse;

/// Size of the transmit and receive record buffers, marker included
pub const BUFF_SIZE: usize = 1024;

/// Largest payload exchanged in one device_write/device_read
pub const DATA_SIZE: usize = 786;
