//! Opaque authentication fields

use sr86x_core::constants::auth_flavor::AUTH_NONE;
use sr86x_xdr::{XdrPacker, XdrUnpacker};

/// Authentication credential or verifier
///
/// Only `AUTH_NONE` is ever produced; received bodies are kept as borrowed
/// slices and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueAuth<'a> {
    pub flavor: u32,
    pub body: &'a [u8],
}

impl OpaqueAuth<'static> {
    /// Empty `AUTH_NONE` field
    pub const NONE: OpaqueAuth<'static> = OpaqueAuth {
        flavor: AUTH_NONE,
        body: &[],
    };
}

impl Default for OpaqueAuth<'static> {
    fn default() -> Self {
        Self::NONE
    }
}

/// Pack an [`OpaqueAuth`]
pub trait AuthPack {
    fn pack_auth(&mut self, auth: &OpaqueAuth<'_>);
}

/// Unpack an [`OpaqueAuth`]
pub trait AuthUnpack<'a> {
    fn unpack_auth(&mut self) -> OpaqueAuth<'a>;
}

impl AuthPack for XdrPacker<'_> {
    fn pack_auth(&mut self, auth: &OpaqueAuth<'_>) {
        self.pack_enum(auth.flavor);
        self.pack_opaque(auth.body);
    }
}

impl<'a> AuthUnpack<'a> for XdrUnpacker<'a> {
    fn unpack_auth(&mut self) -> OpaqueAuth<'a> {
        let flavor = self.unpack_enum();
        let body = self.unpack_opaque();
        OpaqueAuth { flavor, body }
    }
}
