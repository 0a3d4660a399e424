//! Deferred replies and their serialization

use crate::auth::{AuthPack, OpaqueAuth};
use sr86x_core::constants::{RPC_VERSION, accept_stat, msg_type, reject_stat, reply_stat};
use sr86x_xdr::XdrPacker;

/// Error code that selects a MSG_DENIED / RPC_MISMATCH reply
///
/// Codes 0..=5 are accept statuses and produce an accepted reply.
pub const ERROR_RPC_MISMATCH: u32 = 6;

/// Result body packer for [`Response::Custom`]
pub type PackFn = fn(&mut XdrPacker<'_>, u32);

/// Reply armed by a call handler, packed only when the transport can send
#[derive(Debug, Clone, Copy)]
pub enum Response {
    /// Protocol error reply; `accept_stat` code or [`ERROR_RPC_MISMATCH`]
    Error(u32),
    /// Successful reply with no result body
    Void,
    /// Successful reply carrying one unsigned word
    Scalar(u32),
    /// Successful reply whose body is produced by `pack(packer, tag)`
    Custom { pack: PackFn, tag: u32 },
}

impl Response {
    /// Pack the reply body (everything after the record marker)
    ///
    /// `version` is the registered program version, reported as both bounds
    /// of a PROG_MISMATCH reply.
    pub fn pack(&self, packer: &mut XdrPacker<'_>, xid: u32, version: u32) {
        match *self {
            Response::Error(code) => pack_error(packer, xid, version, code),
            Response::Void => pack_success_header(packer, xid),
            Response::Scalar(value) => {
                pack_success_header(packer, xid);
                packer.pack_u32(value);
            }
            Response::Custom { pack, tag } => {
                pack_success_header(packer, xid);
                pack(packer, tag);
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(code) if *code != accept_stat::SUCCESS)
    }
}

fn pack_success_header(packer: &mut XdrPacker<'_>, xid: u32) {
    packer.pack_u32(xid);
    packer.pack_enum(msg_type::REPLY);
    packer.pack_enum(reply_stat::MSG_ACCEPTED);
    packer.pack_auth(&OpaqueAuth::NONE);
    packer.pack_enum(accept_stat::SUCCESS);
}

fn pack_error(packer: &mut XdrPacker<'_>, xid: u32, version: u32, code: u32) {
    packer.pack_u32(xid);
    packer.pack_enum(msg_type::REPLY);

    if code == ERROR_RPC_MISMATCH {
        packer.pack_enum(reply_stat::MSG_DENIED);
        packer.pack_enum(reject_stat::RPC_MISMATCH);
        packer.pack_u32(RPC_VERSION);
        packer.pack_u32(RPC_VERSION);
    } else {
        packer.pack_enum(reply_stat::MSG_ACCEPTED);
        packer.pack_auth(&OpaqueAuth::NONE);
        packer.pack_enum(code);
        if code == accept_stat::PROG_MISMATCH {
            packer.pack_u32(version);
            packer.pack_u32(version);
        }
    }
}
