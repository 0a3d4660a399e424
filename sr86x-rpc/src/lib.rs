//! ONC RPC layer for SR86x instrument control
//!
//! This crate provides:
//! - TCP record marking and fragment reassembly
//! - Call and reply envelopes for the client side
//! - A server call engine that executes calls against a registered program
//!   and streams the replies back out through a bounded send window

pub mod auth;
pub mod header;
pub mod record;
pub mod response;
pub mod server;
pub mod state;
pub mod statistics;

pub use auth::{AuthPack, AuthUnpack, OpaqueAuth};
pub use header::{CallHeader, ReplyHeader};
pub use record::{merge_fragments, Reassembly, RecordMarker};
pub use response::{PackFn, Response};
pub use server::{CallContext, RpcProgram, RpcServer, VoidProgram};
pub use state::CallState;
pub use statistics::RpcStatistics;
