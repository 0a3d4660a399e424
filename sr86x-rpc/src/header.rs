//! Call and reply envelopes for the client side

use crate::auth::{AuthPack, AuthUnpack, OpaqueAuth};
use sr86x_core::ReplyError;
use sr86x_core::constants::{RPC_VERSION, accept_stat, msg_type, reply_stat};
use sr86x_xdr::{XdrPacker, XdrUnpacker};

/// Header of an outgoing call
///
/// Credential and verifier are always `AUTH_NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHeader {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
}

impl CallHeader {
    pub fn new(xid: u32, program: u32, version: u32, procedure: u32) -> Self {
        Self {
            xid,
            program,
            version,
            procedure,
        }
    }

    /// Pack xid, CALL, rpcvers, program, version, procedure, cred and verf
    pub fn pack(&self, packer: &mut XdrPacker<'_>) {
        packer.pack_u32(self.xid);
        packer.pack_enum(msg_type::CALL);
        packer.pack_u32(RPC_VERSION);
        packer.pack_u32(self.program);
        packer.pack_u32(self.version);
        packer.pack_u32(self.procedure);
        packer.pack_auth(&OpaqueAuth::NONE);
        packer.pack_auth(&OpaqueAuth::NONE);
    }
}

/// Accepted, successful reply envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader<'a> {
    pub xid: u32,
    pub verifier: OpaqueAuth<'a>,
}

impl<'a> ReplyHeader<'a> {
    /// Unpack a reply envelope and check it answers call `xid` with SUCCESS
    ///
    /// On success the unpacker is left at the start of the result body.
    pub fn unpack(unpacker: &mut XdrUnpacker<'a>, xid: u32) -> Result<Self, ReplyError> {
        let got = unpacker.unpack_u32();
        check(unpacker)?;
        if got != xid {
            return Err(ReplyError::XidMismatch { expected: xid, got });
        }

        let kind = unpacker.unpack_enum();
        check(unpacker)?;
        if kind != msg_type::REPLY {
            return Err(ReplyError::NotReply(kind));
        }

        let stat = unpacker.unpack_enum();
        check(unpacker)?;
        if stat != reply_stat::MSG_ACCEPTED {
            let reject = unpacker.unpack_enum();
            return Err(ReplyError::Denied(reject));
        }

        let verifier = unpacker.unpack_auth();
        let accept = unpacker.unpack_enum();
        check(unpacker)?;
        if accept != accept_stat::SUCCESS {
            return Err(ReplyError::NotAccepted(accept));
        }

        Ok(Self { xid, verifier })
    }
}

fn check(unpacker: &XdrUnpacker<'_>) -> Result<(), ReplyError> {
    match unpacker.error() {
        Some(err) => Err(ReplyError::Malformed(err)),
        None => Ok(()),
    }
}
