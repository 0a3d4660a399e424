//! Builder for VXI-11 clients
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use sr86x_transport::TcpTransportFactory;
//! use sr86x_vxi11::Vxi11ClientBuilder;
//! use std::time::Duration;
//!
//! let factory = TcpTransportFactory::new("192.168.1.50".parse().unwrap());
//! let client = Vxi11ClientBuilder::new()
//!     .lock_device(true)
//!     .io_timeout(Duration::from_secs(2))
//!     .on_status(|ok, finished| println!("ok={} finished={}", ok, finished))
//!     .build(factory);
//! ```

use crate::client::{StatusCallback, Vxi11Client};
use crate::config::Vxi11Config;
use sr86x_transport::TransportFactory;
use std::fmt;
use std::time::Duration;

/// Builder for [`Vxi11Client`]
///
/// # Default Settings
/// - Client id: 123456
/// - Lock and I/O timeouts: 8000 ms
/// - Device name: `inst0`
/// - Core port: resolved through the portmapper
#[derive(Default)]
pub struct Vxi11ClientBuilder {
    config: Vxi11Config,
    callback: Option<StatusCallback>,
}

impl fmt::Debug for Vxi11ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vxi11ClientBuilder")
            .field("config", &self.config)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

fn millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

impl Vxi11ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn with_config(config: Vxi11Config) -> Self {
        Self {
            config,
            callback: None,
        }
    }

    pub fn client_id(mut self, client_id: i32) -> Self {
        self.config.client_id = client_id;
        self
    }

    /// Request an exclusive lock when the link is created
    pub fn lock_device(mut self, lock: bool) -> Self {
        self.config.lock_device = lock;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = millis(timeout);
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = millis(timeout);
        self
    }

    /// Terminate reads on `term_char`
    pub fn term_char(mut self, term_char: u8) -> Self {
        self.config.term_char = term_char;
        self.config.flags |= sr86x_core::constants::device_flags::TERM_CHR_SET;
        self
    }

    pub fn device_name(mut self, name: &str) -> Self {
        self.config.device_name = name.to_string();
        self
    }

    /// Skip the portmapper and use this core channel port
    pub fn core_port(mut self, port: u16) -> Self {
        self.config.core_port = Some(port);
        self
    }

    /// Called with `(ok, connect_finished)` when bring-up ends or the stream drops
    pub fn on_status<C>(mut self, callback: C) -> Self
    where
        C: Fn(bool, bool) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build<F: TransportFactory>(self, factory: F) -> Vxi11Client<F> {
        let mut client = Vxi11Client::new(factory, self.config);
        if let Some(callback) = self.callback {
            client.set_callback(callback);
        }
        client
    }
}
