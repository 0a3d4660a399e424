//! XDR encoding/decoding for ONC RPC
//!
//! All quantities are 4-byte big-endian units. Opaque data carries a length
//! prefix and is zero-padded to the next 4-byte boundary.
//!
//! Both directions fail softly: an operation that runs off the end of the
//! buffer records [`XdrError::Eof`] and keeps going, so a caller can pack or
//! unpack a whole message and check the error once at the end.

pub mod packer;
pub mod unpacker;

pub use packer::XdrPacker;
pub use sr86x_core::XdrError;
pub use unpacker::XdrUnpacker;

/// XDR unit size in bytes
pub const UNIT: usize = 4;

/// Length of `len` bytes once padded to an XDR unit boundary
pub fn padded_len(len: usize) -> usize {
    len.saturating_add(UNIT - 1) & !(UNIT - 1)
}

/// Record `err` unless an EOF is already recorded
pub(crate) fn record_error(slot: &mut Option<XdrError>, err: XdrError) {
    if slot.is_none() || err == XdrError::Eof {
        *slot = Some(err);
    }
}
