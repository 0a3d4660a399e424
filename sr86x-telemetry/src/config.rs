//! Telemetry receiver settings

use crate::{DEFAULT_STREAM_PORT, RECEIVE_BUFFER_SIZE};
use std::time::Duration;

/// Telemetry receiver configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// UDP port to listen on
    pub port: u16,
    /// Largest datagram accepted, longer ones are truncated
    pub buffer_size: usize,
    /// Pause after a failed receive before trying again
    pub retry_delay: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_STREAM_PORT,
            buffer_size: RECEIVE_BUFFER_SIZE,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl TelemetryConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.port, 1865);
        assert_eq!(config.buffer_size, 1200);
        assert_eq!(TelemetryConfig::default().with_port(2000).port, 2000);
    }
}
