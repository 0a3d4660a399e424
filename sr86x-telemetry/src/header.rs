//! Streaming packet header
//!
//! Layout of the 32-bit header word (always sent big-endian):
//!
//! | Bits  | Field |
//! |-------|-------|
//! | 7-0   | packet counter, +1 per packet |
//! | 11-8  | content type (0-3 float, 4-7 16-bit int) |
//! | 15-12 | length selector, payload = 1024 >> n bytes |
//! | 23-16 | rate selector, rate = 1.25 MHz / 2^n |
//! | 24-25 | overload / error seen in the previous packet |
//! | 28    | payload is little-endian |
//! | 29    | UDP checksum was sent |

use std::fmt;

const OVERLOAD_MASK: u32 = 0x0300_0000;
const LITTLE_ENDIAN_BIT: u32 = 0x1000_0000;
const CHECKSUM_BIT: u32 = 0x2000_0000;

/// Bits that change the CSV column description (content type and rate)
pub const LABEL_MASK: u32 = 0x00ff_0f00;

/// Base sample rate in Hz, divided by 2^rate
pub const BASE_SAMPLE_RATE: f64 = 1.25e6;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    raw: u32,
    pub counter: u8,
    /// Content type; 0 X, 1 XY, 2 RΘ, 3 XYRΘ as floats, 4..=7 the same as i16
    pub what: u8,
    pub length: u8,
    pub rate: u8,
    pub overload: bool,
    pub little_endian: bool,
    pub checksum: bool,
}

impl PacketHeader {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            counter: (raw & 0xff) as u8,
            what: ((raw >> 8) & 0x0f) as u8,
            length: ((raw >> 12) & 0x0f) as u8,
            rate: ((raw >> 16) & 0xff) as u8,
            overload: raw & OVERLOAD_MASK != 0,
            little_endian: raw & LITTLE_ENDIAN_BIT != 0,
            checksum: raw & CHECKSUM_BIT != 0,
        }
    }

    /// Decode the header from the first four bytes of a datagram
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self::from_raw(u32::from_be_bytes(bytes))
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// All selector fields are in range
    pub fn is_valid(&self) -> bool {
        self.what <= 7 && self.length <= 3 && self.rate <= 31
    }

    /// Payload size announced by the length selector
    pub fn byte_length(&self) -> usize {
        1024usize.checked_shr(u32::from(self.length)).unwrap_or(0)
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        BASE_SAMPLE_RATE / 2f64.powi(i32::from(self.rate))
    }

    /// Payload holds 16-bit integer samples
    pub fn is_integer(&self) -> bool {
        self.what >= 4
    }

    /// Column description used in CSV label lines
    pub fn content_label(&self) -> &'static str {
        match self.what {
            1 => "X,Y (float)",
            2 => "R,theta (float)",
            3 => "X,Y,R,theta (float)",
            4 => "X (int)",
            5 => "X,Y (int)",
            6 => "R,theta (int)",
            7 => "X,Y,R,theta (int)",
            _ => "X (float)",
        }
    }

    /// Whether content type or rate differ from `other`
    pub fn label_changed(&self, other: u32) -> bool {
        (self.raw ^ other) & LABEL_MASK != 0
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::from_raw(0)
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} Hz", self.content_label(), self.sample_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let header = PacketHeader::from_raw(0x0011_2233);
        assert_eq!(header.counter, 0x33);
        assert_eq!(header.what, 2);
        assert_eq!(header.length, 1);
        assert_eq!(header.rate, 0x11);
        assert_eq!(header.byte_length(), 512);
        assert!(header.is_valid());
        assert!(!header.overload);
        assert!(!header.little_endian);
    }

    #[test]
    fn test_flag_bits() {
        let header = PacketHeader::from_be_bytes([0x32, 0x00, 0x00, 0x00]);
        assert!(header.overload);
        assert!(header.little_endian);
        assert!(header.checksum);

        assert!(PacketHeader::from_raw(0x0100_0000).overload);
    }

    #[test]
    fn test_out_of_range_fields() {
        assert!(!PacketHeader::from_raw(0x0000_0800).is_valid());
        assert!(!PacketHeader::from_raw(0x0000_4000).is_valid());
        assert!(!PacketHeader::from_raw(0x0020_0000).is_valid());
        assert!(PacketHeader::from_raw(0x001f_3700).is_valid());
    }

    #[test]
    fn test_byte_length_and_rate() {
        assert_eq!(PacketHeader::from_raw(0).byte_length(), 1024);
        assert_eq!(PacketHeader::from_raw(0x3000).byte_length(), 128);
        assert_eq!(PacketHeader::from_raw(0xf000).byte_length(), 0);
        assert_eq!(PacketHeader::from_raw(0).sample_rate(), 1_250_000.0);
        assert_eq!(PacketHeader::from_raw(0x0004_0000).sample_rate(), 78_125.0);
    }

    #[test]
    fn test_label() {
        let header = PacketHeader::from_raw(0x0004_0100);
        assert_eq!(header.to_string(), "X,Y (float) @ 78125 Hz");
        assert!(!header.label_changed(0x0004_01ff));
        assert!(header.label_changed(0x0004_0200));
        assert!(header.label_changed(0x0005_0100));
        assert!(!header.label_changed(0x1304_3100));
    }
}
