//! XDR unpacker over a borrowed byte slice

use crate::{UNIT, XdrError, padded_len, record_error};

/// XDR unpacker reading from a borrowed buffer
///
/// Opaque data is returned as sub-slices of the input, so nothing is copied.
/// A read past the end moves the cursor to the end, yields a zero value and
/// records [`XdrError::Eof`].
pub struct XdrUnpacker<'a> {
    buffer: &'a [u8],
    position: usize,
    error: Option<XdrError>,
}

impl<'a> XdrUnpacker<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            error: None,
        }
    }

    /// Rewind to the start and clear the error
    pub fn reset(&mut self) {
        self.position = 0;
        self.error = None;
    }

    pub fn error(&self) -> Option<XdrError> {
        self.error
    }

    /// Bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.position
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Total size of the input
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Unread tail of the input
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        match self.position.checked_add(len) {
            Some(end) if end <= self.buffer.len() => {
                let slice = &self.buffer[self.position..end];
                self.position = end;
                Some(slice)
            }
            _ => {
                self.position = self.buffer.len();
                record_error(&mut self.error, XdrError::Eof);
                None
            }
        }
    }

    fn take_unit(&mut self) -> Option<[u8; UNIT]> {
        self.take(UNIT)
            .and_then(|bytes| <[u8; UNIT]>::try_from(bytes).ok())
    }

    pub fn unpack_i32(&mut self) -> i32 {
        self.take_unit().map(i32::from_be_bytes).unwrap_or(0)
    }

    pub fn unpack_u32(&mut self) -> u32 {
        self.take_unit().map(u32::from_be_bytes).unwrap_or(0)
    }

    pub fn unpack_enum(&mut self) -> u32 {
        self.unpack_u32()
    }

    /// Unpack a boolean; anything other than 0 or 1 records `BadEnum`
    pub fn unpack_bool(&mut self) -> bool {
        match self.take_unit().map(u32::from_be_bytes) {
            Some(0) | None => false,
            Some(1) => true,
            Some(_) => {
                record_error(&mut self.error, XdrError::BadEnum);
                false
            }
        }
    }

    /// Unpack `len` bytes of fixed-length opaque data and skip the padding
    pub fn unpack_fixed_opaque(&mut self, len: usize) -> &'a [u8] {
        if len == 0 {
            return &[];
        }
        match self.take(padded_len(len)) {
            Some(bytes) if bytes.len() >= len => &bytes[..len],
            _ => {
                record_error(&mut self.error, XdrError::Eof);
                &[]
            }
        }
    }

    /// Unpack length-prefixed opaque data
    pub fn unpack_opaque(&mut self) -> &'a [u8] {
        let len = self.unpack_u32() as usize;
        if self.error == Some(XdrError::Eof) {
            return &[];
        }
        self.unpack_fixed_opaque(len)
    }

    /// Unpack a string; invalid UTF-8 is replaced lossily
    pub fn unpack_string(&mut self) -> String {
        String::from_utf8_lossy(self.unpack_opaque()).into_owned()
    }
}
