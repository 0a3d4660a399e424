//! Packet payload conversion and sample extraction

use crate::header::PacketHeader;

/// Size of the header word at the start of every packet
pub const HEADER_SIZE: usize = 4;

/// Convert a received datagram to host byte order in place
///
/// The header word is always big-endian. The payload is big-endian unless
/// the header's little-endian flag is set, and is converted in 16-bit units
/// for integer content and 32-bit units for float content, over at most
/// `byte_length()` bytes. Returns `None` for datagrams shorter than a header.
pub fn to_host_order(datagram: &mut [u8]) -> Option<PacketHeader> {
    let word: [u8; HEADER_SIZE] = datagram.get(..HEADER_SIZE)?.try_into().ok()?;
    let header = PacketHeader::from_be_bytes(word);
    datagram[..HEADER_SIZE].copy_from_slice(&header.raw().to_ne_bytes());

    let payload = &mut datagram[HEADER_SIZE..];
    let end = header.byte_length().min(payload.len());
    let payload = &mut payload[..end];

    if header.is_integer() {
        for unit in payload.chunks_exact_mut(2) {
            let bytes = [unit[0], unit[1]];
            let value = if header.little_endian {
                u16::from_le_bytes(bytes)
            } else {
                u16::from_be_bytes(bytes)
            };
            unit.copy_from_slice(&value.to_ne_bytes());
        }
    } else {
        for unit in payload.chunks_exact_mut(4) {
            let bytes = [unit[0], unit[1], unit[2], unit[3]];
            let value = if header.little_endian {
                u32::from_le_bytes(bytes)
            } else {
                u32::from_be_bytes(bytes)
            };
            unit.copy_from_slice(&value.to_ne_bytes());
        }
    }

    Some(header)
}

/// Float at 32-bit word `index` of a host-order payload, 0 past the end
pub fn float_at(payload: &[u8], index: usize) -> f32 {
    word_at(payload, index)
        .map(f32::from_ne_bytes)
        .unwrap_or(0.0)
}

/// The two 16-bit integers packed in 32-bit word `index`, zeros past the end
pub fn int_pair_at(payload: &[u8], index: usize) -> (i16, i16) {
    match word_at(payload, index) {
        Some(w) => (
            i16::from_ne_bytes([w[0], w[1]]),
            i16::from_ne_bytes([w[2], w[3]]),
        ),
        None => (0, 0),
    }
}

fn word_at(payload: &[u8], index: usize) -> Option<[u8; 4]> {
    let start = index.checked_mul(4)?;
    payload.get(start..start + 4)?.try_into().ok()
}

/// First sample of a packet, mapped to lock-in channels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Samples {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub theta: f32,
}

impl Samples {
    /// Read the leading sample of a host-order payload; unused channels are 0
    pub fn first(header: &PacketHeader, payload: &[u8]) -> Self {
        let mut s = Samples::default();
        match header.what {
            1 => {
                s.x = float_at(payload, 0);
                s.y = float_at(payload, 1);
            }
            2 => {
                s.r = float_at(payload, 0);
                s.theta = float_at(payload, 1);
            }
            3 => {
                s.x = float_at(payload, 0);
                s.y = float_at(payload, 1);
                s.r = float_at(payload, 2);
                s.theta = float_at(payload, 3);
            }
            4 => {
                s.x = f32::from(int_pair_at(payload, 0).0);
            }
            5 => {
                let (x, y) = int_pair_at(payload, 0);
                s.x = f32::from(x);
                s.y = f32::from(y);
            }
            6 => {
                let (r, theta) = int_pair_at(payload, 0);
                s.r = f32::from(r);
                s.theta = f32::from(theta);
            }
            7 => {
                let (x, y) = int_pair_at(payload, 0);
                let (r, theta) = int_pair_at(payload, 1);
                s.x = f32::from(x);
                s.y = f32::from(y);
                s.r = f32::from(r);
                s.theta = f32::from(theta);
            }
            _ => {
                s.x = float_at(payload, 0);
            }
        }
        s
    }
}
