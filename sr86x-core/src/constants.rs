//! ONC RPC and VXI-11 wire constants
//!
//! Values follow RFC 1831 and the VXI-11 standard. Program numbers are
//! those registered with the portmapper on the instrument.

/// RPC protocol version understood by both peers
pub const RPC_VERSION: u32 = 2;

/// Last-fragment bit of a TCP record marker
pub const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Fragment length mask of a TCP record marker
pub const FRAGMENT_LENGTH_MASK: u32 = 0x7fff_ffff;

/// Size of a TCP record marker in bytes
pub const RECORD_MARKER_SIZE: usize = 4;

/// Message type
pub mod msg_type {
    pub const CALL: u32 = 0;
    pub const REPLY: u32 = 1;
}

/// Reply status
pub mod reply_stat {
    pub const MSG_ACCEPTED: u32 = 0;
    pub const MSG_DENIED: u32 = 1;
}

/// Accept status of an accepted reply
pub mod accept_stat {
    pub const SUCCESS: u32 = 0;
    pub const PROG_UNAVAIL: u32 = 1;
    pub const PROG_MISMATCH: u32 = 2;
    pub const PROC_UNAVAIL: u32 = 3;
    pub const GARBAGE_ARGS: u32 = 4;
    pub const SYSTEM_ERR: u32 = 5;
}

/// Reject status of a denied reply
pub mod reject_stat {
    pub const RPC_MISMATCH: u32 = 0;
    pub const AUTH_ERROR: u32 = 1;
}

/// Authentication flavors
pub mod auth_flavor {
    pub const AUTH_NONE: u32 = 0;
    pub const AUTH_SYS: u32 = 1;
    pub const AUTH_SHORT: u32 = 2;
}

/// Portmapper program
pub const PORTMAPPER_PROG: u32 = 100_000;
pub const PORTMAPPER_VERS: u32 = 2;
pub const PORTMAPPER_PORT: u16 = 111;
pub const PMAPPROC_GETPORT: u32 = 3;

/// IP protocol number passed to GETPORT
pub const IPPROTO_TCP: u32 = 6;

/// VXI-11 core channel
pub const DEVICE_CORE_PROG: u32 = 395_183;
pub const DEVICE_CORE_VERS: u32 = 1;

/// VXI-11 abort channel (never opened)
pub const DEVICE_ASYNC_PROG: u32 = 395_184;
pub const DEVICE_ASYNC_VERS: u32 = 1;

/// VXI-11 interrupt channel (never opened)
pub const DEVICE_INTR_PROG: u32 = 395_185;
pub const DEVICE_INTR_VERS: u32 = 1;

/// VXI-11 core procedures
pub mod device_proc {
    pub const CREATE_LINK: u32 = 10;
    pub const DEVICE_WRITE: u32 = 11;
    pub const DEVICE_READ: u32 = 12;
    pub const DEVICE_READSTB: u32 = 13;
    pub const DEVICE_TRIGGER: u32 = 14;
    pub const DEVICE_CLEAR: u32 = 15;
    pub const DEVICE_REMOTE: u32 = 16;
    pub const DEVICE_LOCAL: u32 = 17;
    pub const DEVICE_LOCK: u32 = 18;
    pub const DEVICE_UNLOCK: u32 = 19;
    pub const DESTROY_LINK: u32 = 23;
}

/// VXI-11 operation flags
pub mod device_flags {
    pub const WAIT_LOCK: u32 = 0x01;
    pub const END: u32 = 0x08;
    pub const TERM_CHR_SET: u32 = 0x80;
}
