//! Server-side call engine
//!
//! [`RpcServer`] sits between a byte-stream connection and one registered
//! [`RpcProgram`]. The connection feeds it received bytes with
//! [`new_data`](RpcServer::new_data), pulls reply bytes with
//! [`send_data`](RpcServer::send_data) and reports delivered bytes with
//! [`acked`](RpcServer::acked). One call is in flight at a time; further
//! records wait in the bounded receive buffer until the reply is fully
//! acknowledged.

use crate::auth::AuthUnpack;
use crate::record::{merge_fragments, Reassembly, RecordMarker};
use crate::response::{PackFn, Response, ERROR_RPC_MISMATCH};
use crate::state::CallState;
use crate::statistics::RpcStatistics;
use sr86x_core::constants::{RECORD_MARKER_SIZE, RPC_VERSION, accept_stat, msg_type};
use sr86x_xdr::{XdrPacker, XdrUnpacker};
use std::borrow::Cow;

/// A program served by an [`RpcServer`]
///
/// `call` receives the procedure number and the packed arguments of one
/// call. It must either arm a response on `ctx`, or return without one to be
/// polled again with the unconsumed arguments. The return value is the
/// number of argument bytes consumed.
pub trait RpcProgram {
    fn program(&self) -> u32;

    fn version(&self) -> u32;

    fn call(&mut self, ctx: &mut CallContext, procedure: u32, args: &[u8]) -> usize {
        let _ = procedure;
        ctx.create_void_response();
        args.len()
    }
}

/// Program that answers every procedure with a void reply
#[derive(Debug, Clone, Copy)]
pub struct VoidProgram {
    pub program: u32,
    pub version: u32,
}

impl RpcProgram for VoidProgram {
    fn program(&self) -> u32 {
        self.program
    }

    fn version(&self) -> u32 {
        self.version
    }
}

/// State of the call in flight, handed to [`RpcProgram::call`]
#[derive(Debug)]
pub struct CallContext {
    xid: u32,
    version: u32,
    procedure: u32,
    state: CallState,
    response: Option<Response>,
    new_response: bool,
    sent_len: usize,
    sent_record_len: usize,
}

impl CallContext {
    fn new(version: u32) -> Self {
        Self {
            xid: 0,
            version,
            procedure: 0,
            state: CallState::Idle,
            response: None,
            new_response: false,
            sent_len: 0,
            sent_record_len: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.version);
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn procedure(&self) -> u32 {
        self.procedure
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Whether a response was armed and not yet handed to `send_data`
    pub fn has_new_response(&self) -> bool {
        self.new_response
    }

    fn arm(&mut self, response: Response) {
        self.response = Some(response);
        self.state = CallState::ResponsePending;
        self.new_response = true;
    }

    /// Complete the call with a protocol error
    ///
    /// `code` is an `accept_stat` value or
    /// [`ERROR_RPC_MISMATCH`](crate::response::ERROR_RPC_MISMATCH).
    pub fn create_error_response(&mut self, code: u32) {
        self.arm(Response::Error(code));
    }

    pub fn create_void_response(&mut self) {
        self.arm(Response::Void);
    }

    pub fn create_long_response(&mut self, value: u32) {
        self.arm(Response::Scalar(value));
    }

    /// Complete the call with a body packed later by `pack(packer, tag)`
    pub fn create_response(&mut self, pack: PackFn, tag: u32) {
        self.arm(Response::Custom { pack, tag });
    }
}

/// Call engine for one connection
pub struct RpcServer<P: RpcProgram> {
    program: P,
    ctx: CallContext,
    rcv_buffer: Vec<u8>,
    rcv_record_len: usize,
    max_size: usize,
    stats: RpcStatistics,
}

impl<P: RpcProgram> RpcServer<P> {
    /// Create a server for `program` with a `max_size` byte receive buffer
    ///
    /// Records larger than `max_size` (marker included) are dropped without
    /// a reply.
    pub fn new(program: P, max_size: usize) -> Self {
        let version = program.version();
        Self {
            program,
            ctx: CallContext::new(version),
            rcv_buffer: Vec::with_capacity(max_size),
            rcv_record_len: 0,
            max_size,
            stats: RpcStatistics::new(),
        }
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut P {
        &mut self.program
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    pub fn state(&self) -> CallState {
        self.ctx.state
    }

    pub fn procedure(&self) -> u32 {
        self.ctx.procedure
    }

    pub fn has_new_response(&self) -> bool {
        self.ctx.new_response
    }

    pub fn statistics(&self) -> &RpcStatistics {
        &self.stats
    }

    /// Free space in the receive buffer
    pub fn window(&self) -> usize {
        self.max_size.saturating_sub(self.rcv_buffer.len())
    }

    /// Return to `Idle` with an empty receive buffer
    pub fn reset(&mut self) {
        self.ctx.reset();
        self.rcv_buffer.clear();
        self.rcv_record_len = 0;
    }

    pub fn connected(&mut self) {
        log::debug!("RPC connection opened");
        self.reset();
    }

    pub fn closed(&mut self) {
        log::debug!("RPC connection closed");
        self.reset();
    }

    pub fn aborted(&mut self) {
        log::debug!("RPC connection aborted");
        self.reset();
    }

    pub fn timed_out(&mut self) {
        log::debug!("RPC connection timed out");
        self.reset();
    }

    /// Accept received bytes and execute every complete call they finish
    ///
    /// Returns the number of bytes taken from `data`. Bytes that do not fit
    /// in the receive buffer are left for the caller to offer again.
    pub fn new_data(&mut self, data: &[u8]) -> usize {
        let mut accepted;
        let mut pending: Cow<'_, [u8]>;

        if self.rcv_buffer.is_empty()
            && data.len() < self.max_size
            && self.ctx.state == CallState::Idle
        {
            // Nothing buffered: work on the caller's slice directly
            accepted = data.len();
            pending = Cow::Borrowed(data);
        } else {
            accepted = top_up(&mut self.rcv_buffer, data, 0, self.max_size);
            pending = Cow::Owned(std::mem::take(&mut self.rcv_buffer));
        }

        while self.ctx.state == CallState::Idle && !pending.is_empty() {
            match merge_fragments(&mut pending, self.max_size) {
                Reassembly::Complete(record_len) => {
                    self.stats.increment_records_received();
                    let count = self.process_record(&pending[..record_len]);
                    self.rcv_record_len = record_len - count;

                    let mut buffer = match pending {
                        Cow::Borrowed(bytes) => {
                            let mut buffer = std::mem::take(&mut self.rcv_buffer);
                            buffer.clear();
                            buffer.extend_from_slice(&bytes[count..]);
                            buffer
                        }
                        Cow::Owned(mut buffer) => {
                            buffer.drain(..count);
                            buffer
                        }
                    };
                    accepted += top_up(&mut buffer, data, accepted, self.max_size);
                    pending = Cow::Owned(buffer);
                }
                Reassembly::Incomplete => {
                    match pending {
                        Cow::Borrowed(bytes) => self.rcv_buffer.extend_from_slice(bytes),
                        Cow::Owned(buffer) => self.rcv_buffer = buffer,
                    }
                    return accepted;
                }
                Reassembly::Oversize => {
                    log::warn!(
                        "Dropping RPC record larger than {} byte receive buffer",
                        self.max_size
                    );
                    self.stats.increment_records_dropped();
                    if let Cow::Owned(mut buffer) = pending {
                        buffer.clear();
                        self.rcv_buffer = buffer;
                    }
                    self.rcv_record_len = 0;
                    return data.len();
                }
            }
        }

        if let Cow::Owned(buffer) = pending {
            self.rcv_buffer = buffer;
        }
        self.process_pending();
        accepted += top_up(&mut self.rcv_buffer, data, accepted, self.max_size);
        accepted
    }

    /// Run a call that is still executing, or start a buffered one
    ///
    /// Call this regularly while a program has calls pending.
    pub fn process_pending(&mut self) {
        let ready = match self.ctx.state {
            CallState::Idle if !self.rcv_buffer.is_empty() => {
                let mut pending = Cow::Owned(std::mem::take(&mut self.rcv_buffer));
                let outcome = merge_fragments(&mut pending, self.max_size);
                self.rcv_buffer = pending.into_owned();
                match outcome {
                    Reassembly::Complete(record_len) => {
                        self.stats.increment_records_received();
                        self.rcv_record_len = record_len;
                        true
                    }
                    _ => false,
                }
            }
            CallState::ExecutionPending => true,
            _ => false,
        };

        if ready {
            let buffer = std::mem::take(&mut self.rcv_buffer);
            let len = self.rcv_record_len.min(buffer.len());
            let count = self.process_record(&buffer[..len]);
            self.rcv_buffer = buffer;
            if count > 0 {
                self.rcv_buffer.drain(..count);
                self.rcv_record_len -= count;
            }
        }
    }

    /// Pack the unsent part of the pending reply into `out`
    ///
    /// The whole reply is regenerated on every call; bytes already reported
    /// through [`acked`](Self::acked) are skipped. Returns the number of
    /// bytes written, 0 when no reply is pending.
    pub fn send_data(&mut self, out: &mut [u8]) -> usize {
        if self.ctx.state != CallState::ResponsePending {
            return 0;
        }
        let Some(response) = self.ctx.response else {
            return 0;
        };
        self.ctx.new_response = false;

        let mut packer = XdrPacker::with_offset(out, self.ctx.sent_len);
        packer.pack_u32(0);
        response.pack(&mut packer, self.ctx.xid, self.ctx.version);

        self.ctx.sent_record_len = packer.packed_size();
        let record_size = (self.ctx.sent_record_len - RECORD_MARKER_SIZE) as u32;
        let actual_size = packer.actual_size();

        packer.reset();
        packer.pack_u32(RecordMarker::last(record_size).to_u32());
        actual_size
    }

    /// Record that `len` more reply bytes reached the peer
    pub fn acked(&mut self, len: usize) {
        if self.ctx.state != CallState::ResponsePending {
            return;
        }
        self.ctx.sent_len += len;
        if self.ctx.sent_len >= self.ctx.sent_record_len {
            log::debug!(
                "RPC reply xid {} complete ({} bytes)",
                self.ctx.xid,
                self.ctx.sent_record_len
            );
            self.stats.increment_replies_sent();
            self.ctx.sent_len = 0;
            self.ctx.sent_record_len = 0;
            self.ctx.response = None;
            self.ctx.state = CallState::Idle;
        }
    }

    /// Execute `record`: the whole record when idle, else the rest of its arguments
    fn process_record(&mut self, record: &[u8]) -> usize {
        let mut count = 0;

        if self.ctx.state == CallState::Idle {
            count = self.process_header(record);
        }
        if self.ctx.state.is_executing() {
            let args = &record[count.min(record.len())..];
            let procedure = self.ctx.procedure;
            count += self.program.call(&mut self.ctx, procedure, args).min(args.len());

            if self.ctx.state == CallState::ResponsePending {
                // Arguments the handler left behind belong to this call
                count = record.len();
            } else {
                self.ctx.state = CallState::ExecutionPending;
            }
        }
        count
    }

    /// Validate the call header; returns the header length when the call
    /// should execute, else the whole record
    fn process_header(&mut self, record: &[u8]) -> usize {
        let mut unpacker = XdrUnpacker::new(record);

        let _marker = unpacker.unpack_u32();
        self.ctx.xid = unpacker.unpack_u32();
        let kind = unpacker.unpack_enum();
        if unpacker.error().is_some() || kind != msg_type::CALL {
            log::debug!("Ignoring non-call RPC message (type {})", kind);
            self.stats.increment_ignored_messages();
            return record.len();
        }

        if unpacker.unpack_u32() != RPC_VERSION {
            return self.reject(ERROR_RPC_MISMATCH, record.len());
        }
        let program = unpacker.unpack_u32();
        if program != self.program.program() {
            log::warn!("RPC call for unregistered program {}", program);
            return self.reject(accept_stat::PROG_UNAVAIL, record.len());
        }
        if unpacker.unpack_u32() != self.program.version() {
            return self.reject(accept_stat::PROG_MISMATCH, record.len());
        }
        self.ctx.procedure = unpacker.unpack_u32();

        let _cred = unpacker.unpack_auth();
        let _verf = unpacker.unpack_auth();
        if unpacker.error().is_some() {
            return self.reject(accept_stat::GARBAGE_ARGS, record.len());
        }

        if self.ctx.procedure == 0 {
            self.ctx.create_error_response(accept_stat::SUCCESS);
            return record.len();
        }

        self.ctx.state = CallState::FirstExecution;
        unpacker.consumed()
    }

    fn reject(&mut self, code: u32, len: usize) -> usize {
        log::debug!("RPC call xid {} rejected with code {}", self.ctx.xid, code);
        self.stats.increment_error_replies();
        self.ctx.create_error_response(code);
        len
    }
}

/// Append as much of `data[offset..]` to `buffer` as fits under `max_size`
fn top_up(buffer: &mut Vec<u8>, data: &[u8], offset: usize, max_size: usize) -> usize {
    if offset >= data.len() || buffer.len() >= max_size {
        return 0;
    }
    let count = (max_size - buffer.len()).min(data.len() - offset);
    buffer.extend_from_slice(&data[offset..offset + count]);
    count
}
