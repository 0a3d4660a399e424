//! VXI-11 link parameters

/// Parameters sent with VXI-11 calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vxi11Config {
    /// Client id passed to create_link
    pub client_id: i32,
    /// Ask for an exclusive lock when creating the link
    pub lock_device: bool,
    /// Lock timeout in milliseconds
    pub lock_timeout: u32,
    /// I/O timeout in milliseconds
    pub io_timeout: u32,
    /// Operation flags sent with every call
    pub flags: u32,
    /// Read termination character, used when `TERM_CHR_SET` is in `flags`
    pub term_char: u8,
    /// Device name passed to create_link
    pub device_name: String,
    /// Core channel port; `None` asks the portmapper
    pub core_port: Option<u16>,
}

impl Default for Vxi11Config {
    fn default() -> Self {
        Self {
            client_id: 123_456,
            lock_device: false,
            lock_timeout: 8000,
            io_timeout: 8000,
            flags: 0,
            term_char: 0,
            device_name: "inst0".to_string(),
            core_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Vxi11Config::default();
        assert_eq!(config.client_id, 123_456);
        assert_eq!(config.lock_timeout, 8000);
        assert_eq!(config.io_timeout, 8000);
        assert_eq!(config.device_name, "inst0");
        assert!(config.core_port.is_none());
    }
}
