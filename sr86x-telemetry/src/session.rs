//! Capture session: decode state, counters and the output sink
//!
//! The receive loop feeds datagrams in; a polling collaborator takes the
//! status, which resets the byte, missed and overload counters. Decode state
//! and the sink sit behind separate locks so that opening or closing a file
//! never waits on packet decoding bookkeeping and vice versa.

use crate::header::PacketHeader;
use crate::packet::{HEADER_SIZE, Samples, to_host_order};
use crate::sink::CaptureSink;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Snapshot handed to the display side
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryStatus {
    /// Content type of the latest packet
    pub what: u8,
    /// Rate selector of the latest packet
    pub rate: u8,
    pub samples: Samples,
    /// Bytes received since the last status
    pub bytes: usize,
    /// A packet was lost since the last status
    pub missed: bool,
    /// Overload, error or an invalid header since the last status
    pub over: bool,
}

#[derive(Debug, Default)]
struct DecodeState {
    header: PacketHeader,
    samples: Samples,
    last_counter: Option<u8>,
    bytes: usize,
    missed: bool,
    over: bool,
}

/// Shared state of one telemetry capture
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: Mutex<DecodeState>,
    sink: Mutex<Option<CaptureSink>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the output sink; the next packet starts a fresh counter sequence
    pub fn open_sink(&self, sink: CaptureSink) {
        let previous = lock(&self.sink).replace(sink);
        if let Some(mut previous) = previous {
            if let Err(e) = previous.flush() {
                log::warn!("Failed to flush capture file: {}", e);
            }
        }
        lock(&self.state).last_counter = None;
    }

    /// Flush and drop the output sink
    pub fn close_sink(&self) {
        if let Some(mut sink) = lock(&self.sink).take() {
            if let Err(e) = sink.flush() {
                log::warn!("Failed to flush capture file: {}", e);
            }
        }
    }

    pub fn has_sink(&self) -> bool {
        lock(&self.sink).is_some()
    }

    /// Decode one datagram and persist it
    ///
    /// The datagram is converted to host byte order in place.
    pub fn process_datagram(&self, datagram: &mut [u8]) {
        let mut state = lock(&self.state);
        state.bytes += datagram.len();

        let Some(header) = to_host_order(datagram) else {
            log::debug!("Ignoring {}-byte datagram", datagram.len());
            return;
        };

        let dropped = match state.last_counter {
            Some(previous) => {
                let expected = previous.wrapping_add(1);
                (expected != header.counter).then(|| header.counter.wrapping_sub(expected))
            }
            None => None,
        };
        state.last_counter = Some(header.counter);
        if let Some(n) = dropped {
            state.missed = true;
            log::warn!("Dropped {} packets before counter {}", n, header.counter);
        }

        state.header = header;
        state.samples = Samples::first(&header, &datagram[HEADER_SIZE..]);
        state.over |= header.overload || !header.is_valid();
        drop(state);

        let mut sink = lock(&self.sink);
        if let Some(sink) = sink.as_mut() {
            let result = match dropped {
                Some(n) => sink.write_drop(n),
                None => Ok(()),
            }
            .and_then(|_| sink.write_packet(&header, datagram));
            if let Err(e) = result {
                log::warn!("Failed to write capture file: {}", e);
            }
        }
    }

    /// Latest sample and counters; resets bytes, missed and over
    pub fn take_status(&self) -> TelemetryStatus {
        let mut state = lock(&self.state);
        let status = TelemetryStatus {
            what: state.header.what,
            rate: state.header.rate,
            samples: state.samples,
            bytes: state.bytes,
            missed: state.missed,
            over: state.over,
        };
        state.bytes = 0;
        state.missed = false;
        state.over = false;
        status
    }

    /// Forget the previous counter so the next packet never counts as a drop
    pub fn restart_sequence(&self) {
        lock(&self.state).last_counter = None;
    }
}
