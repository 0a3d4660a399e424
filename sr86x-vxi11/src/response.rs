//! Mirror of the last device reply

use crate::DATA_SIZE;

/// Fields of the most recent VXI-11 reply
///
/// Each call overwrites only the fields its reply carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    /// Device error code, 0 on success
    pub error: i32,
    /// Reason bits of the last device_read
    pub reason: i32,
    /// Status byte of the last device_readstb
    pub stb: u8,
    /// Bytes accepted by the last device_write
    pub size: u32,
    /// Link id returned by create_link, -1 when none
    pub lid: i32,
    pub abort_port: u16,
    /// Largest device_write payload, never above [`DATA_SIZE`]
    pub max_recv_size: usize,
    /// Data of the last device_read
    pub data: String,
}

impl Default for DeviceResponse {
    fn default() -> Self {
        Self {
            error: 0,
            reason: 0,
            stb: 0,
            size: 0,
            lid: -1,
            abort_port: 0,
            max_recv_size: DATA_SIZE,
            data: String::new(),
        }
    }
}
