//! XDR packer for RPC calls and replies

use crate::{UNIT, XdrError, padded_len, record_error};

/// XDR packer writing into a caller-owned buffer
///
/// The packer tracks a *logical* cursor that starts at zero. Only bytes whose
/// logical position falls inside the window `[offset, offset + buffer.len())`
/// are stored; everything else is counted but dropped. This lets a reply be
/// regenerated from the start while only the unsent tail (everything past
/// `offset`) lands in the buffer.
///
/// Writing past the end of the window clips the write and records
/// [`XdrError::Eof`].
///
/// # Sizes
/// - [`packed_size`](Self::packed_size): logical bytes packed so far,
///   including the skipped offset and anything that did not fit
/// - [`actual_size`](Self::actual_size): bytes materially written to the
///   buffer, never more than the buffer length
pub struct XdrPacker<'a> {
    buffer: &'a mut [u8],
    offset: usize,
    position: usize,
    error: Option<XdrError>,
}

impl<'a> XdrPacker<'a> {
    /// Create a packer whose window starts at logical byte zero
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self::with_offset(buffer, 0)
    }

    /// Create a packer that skips the first `offset` logical bytes
    pub fn with_offset(buffer: &'a mut [u8], offset: usize) -> Self {
        Self {
            buffer,
            offset,
            position: 0,
            error: None,
        }
    }

    /// Rewind to logical byte zero and clear the error
    pub fn reset(&mut self) {
        self.position = 0;
        self.error = None;
    }

    /// The recorded error, if any
    pub fn error(&self) -> Option<XdrError> {
        self.error
    }

    /// Logical number of bytes packed
    pub fn packed_size(&self) -> usize {
        self.position
    }

    /// Number of bytes actually stored in the buffer
    pub fn actual_size(&self) -> usize {
        self.position
            .saturating_sub(self.offset)
            .min(self.buffer.len())
    }

    /// Bytes stored in the buffer so far
    pub fn packed_data(&self) -> &[u8] {
        &self.buffer[..self.actual_size()]
    }

    fn pack_raw(&mut self, bytes: &[u8]) {
        let start = self.position;
        let end = start + bytes.len();
        let window_start = self.offset;
        let window_end = self.offset + self.buffer.len();

        if end > window_start && start < window_end {
            let from = start.max(window_start);
            let to = end.min(window_end);
            self.buffer[from - window_start..to - window_start]
                .copy_from_slice(&bytes[from - start..to - start]);
        }
        if end > window_end {
            record_error(&mut self.error, XdrError::Eof);
        }
        self.position = end;
    }

    fn pack_padding(&mut self, len: usize) {
        let pad = padded_len(len) - len;
        if pad > 0 {
            self.pack_raw(&[0u8; UNIT][..pad]);
        }
    }

    /// Pack a signed 32-bit integer
    pub fn pack_i32(&mut self, value: i32) {
        self.pack_raw(&value.to_be_bytes());
    }

    /// Pack an unsigned 32-bit integer
    pub fn pack_u32(&mut self, value: u32) {
        self.pack_raw(&value.to_be_bytes());
    }

    /// Pack an enumeration discriminant
    pub fn pack_enum(&mut self, value: u32) {
        self.pack_u32(value);
    }

    /// Pack a boolean as 1 or 0
    pub fn pack_bool(&mut self, value: bool) {
        self.pack_u32(u32::from(value));
    }

    /// Pack fixed-length opaque data plus zero padding
    pub fn pack_fixed_opaque(&mut self, data: &[u8]) {
        self.pack_raw(data);
        self.pack_padding(data.len());
    }

    /// Pack variable-length opaque data: length, bytes, zero padding
    pub fn pack_opaque(&mut self, data: &[u8]) {
        self.pack_u32(data.len() as u32);
        self.pack_fixed_opaque(data);
    }

    /// Pack a string as variable-length opaque data
    pub fn pack_string(&mut self, value: &str) {
        self.pack_opaque(value.as_bytes());
    }
}
