//! TCP record marking (RFC 1831 section 10)
//!
//! A record is one or more fragments, each preceded by a 4-byte big-endian
//! marker whose top bit flags the last fragment and whose low 31 bits give
//! the fragment length.

use sr86x_core::constants::{FRAGMENT_LENGTH_MASK, LAST_FRAGMENT, RECORD_MARKER_SIZE};
use std::borrow::Cow;

/// Decoded record marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMarker {
    pub length: u32,
    pub last: bool,
}

impl RecordMarker {
    /// Marker for a single-fragment record carrying `length` bytes
    pub fn last(length: u32) -> Self {
        Self { length, last: true }
    }

    pub fn from_u32(word: u32) -> Self {
        Self {
            length: word & FRAGMENT_LENGTH_MASK,
            last: word & LAST_FRAGMENT != 0,
        }
    }

    pub fn to_u32(self) -> u32 {
        let flag = if self.last { LAST_FRAGMENT } else { 0 };
        (self.length & FRAGMENT_LENGTH_MASK) | flag
    }

    pub fn encode(self) -> [u8; RECORD_MARKER_SIZE] {
        self.to_u32().to_be_bytes()
    }

    /// Decode the marker at the front of `bytes`, if there are enough
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let word: [u8; RECORD_MARKER_SIZE] = bytes.get(..RECORD_MARKER_SIZE)?.try_into().ok()?;
        Some(Self::from_u32(u32::from_be_bytes(word)))
    }
}

/// Outcome of [`merge_fragments`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassembly {
    /// A whole record of this many bytes (marker included) is at the front
    Complete(usize),
    /// More bytes are needed
    Incomplete,
    /// The record cannot fit in the receive buffer and must be dropped
    Oversize,
}

/// Merge the fragments of the record at the front of `data`
///
/// Each merge rewrites the head marker with the running length and removes
/// the interior marker, so a complete record always ends up as a single
/// fragment with the last bit set. Borrowed input stays borrowed until a
/// merge actually has to rewrite it.
///
/// Bytes after the record are left untouched.
pub fn merge_fragments(data: &mut Cow<'_, [u8]>, max_size: usize) -> Reassembly {
    let Some(head) = RecordMarker::decode(&data[..]) else {
        return Reassembly::Incomplete;
    };

    let mut length = head.length as usize;
    let mut last = head.last;
    let mut offset = length.saturating_add(RECORD_MARKER_SIZE);

    while !last && length.saturating_add(RECORD_MARKER_SIZE) <= max_size {
        let Some(next) = data.get(offset..).and_then(RecordMarker::decode) else {
            break;
        };
        length = length.saturating_add(next.length as usize);
        last = next.last;

        let buf = data.to_mut();
        let merged = RecordMarker {
            length: length.min(FRAGMENT_LENGTH_MASK as usize) as u32,
            last,
        };
        buf[..RECORD_MARKER_SIZE].copy_from_slice(&merged.encode());
        buf.drain(offset..offset + RECORD_MARKER_SIZE);
        offset = offset.saturating_add(next.length as usize);
    }

    if length.saturating_add(RECORD_MARKER_SIZE) > max_size {
        Reassembly::Oversize
    } else if !last || data.len() < offset {
        Reassembly::Incomplete
    } else {
        Reassembly::Complete(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(len: u32, last: bool, fill: u8) -> Vec<u8> {
        let mut out = RecordMarker { length: len, last }.encode().to_vec();
        out.extend(std::iter::repeat_n(fill, len as usize));
        out
    }

    #[test]
    fn test_marker_bits() {
        let marker = RecordMarker::from_u32(0x8000_001c);
        assert!(marker.last);
        assert_eq!(marker.length, 28);
        assert_eq!(RecordMarker::last(28).to_u32(), 0x8000_001c);
        assert_eq!(RecordMarker::decode(&[0, 0]), None);
    }

    #[test]
    fn test_single_fragment_stays_borrowed() {
        let input = fragment(8, true, 1);
        let mut data = Cow::Borrowed(input.as_slice());
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Complete(12));
        assert!(matches!(data, Cow::Borrowed(_)));
    }

    #[test]
    fn test_two_fragments_merge() {
        let mut input = fragment(5, false, 0xaa);
        input.extend(fragment(3, true, 0xbb));
        input.extend([9, 9]);
        let mut data = Cow::Borrowed(input.as_slice());

        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Complete(12));
        assert!(matches!(data, Cow::Owned(_)));
        assert_eq!(RecordMarker::decode(&data), Some(RecordMarker::last(8)));
        assert_eq!(&data[4..9], &[0xaa; 5]);
        assert_eq!(&data[9..12], &[0xbb; 3]);
        assert_eq!(&data[12..], &[9, 9]);
    }

    #[test]
    fn test_missing_second_marker_is_incomplete() {
        let input = fragment(5, false, 0);
        let mut data = Cow::Borrowed(input.as_slice());
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Incomplete);
    }

    #[test]
    fn test_short_payload_is_incomplete() {
        let input = fragment(8, true, 0);
        let mut data = Cow::Borrowed(&input[..7]);
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Incomplete);

        let mut data = Cow::Borrowed(&input[..3]);
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Incomplete);
    }

    #[test]
    fn test_oversize_record() {
        let input = fragment(61, true, 0);
        let mut data = Cow::Borrowed(input.as_slice());
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Oversize);

        let mut input = fragment(40, false, 0);
        input.extend(fragment(40, true, 0));
        let mut data = Cow::Borrowed(input.as_slice());
        assert_eq!(merge_fragments(&mut data, 64), Reassembly::Oversize);
    }

    #[test]
    fn test_oversize_detected_from_marker_alone() {
        let input = RecordMarker::last(0x7fff_ffff).encode();
        let mut data = Cow::Borrowed(input.as_slice());
        assert_eq!(merge_fragments(&mut data, 1024), Reassembly::Oversize);
    }
}
