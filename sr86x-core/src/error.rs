use thiserror::Error;

/// Sticky error raised by the XDR packer and unpacker
///
/// `Eof` always wins: once recorded it is never replaced by a lesser error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdrError {
    #[error("end of buffer")]
    Eof,

    #[error("bad enum value")]
    BadEnum,
}

/// Reasons an RPC reply envelope can be refused by the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply xid {got} does not match call xid {expected}")]
    XidMismatch { expected: u32, got: u32 },

    #[error("message type {0} is not a reply")]
    NotReply(u32),

    #[error("message denied (reject status {0})")]
    Denied(u32),

    #[error("call not executed (accept status {0})")]
    NotAccepted(u32),

    #[error("reply envelope truncated: {0}")]
    Malformed(XdrError),

    #[error("record marker 0x{0:08X} is not a final fragment")]
    NotFinalFragment(u32),
}

/// Main error type for SR86x operations
#[derive(Error, Debug)]
pub enum Sr86xError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("XDR error: {0}")]
    Xdr(#[from] XdrError),

    #[error("RPC reply rejected: {0}")]
    Rpc(#[from] ReplyError),

    #[error("Device error {code}: {message}")]
    Device { code: i32, message: &'static str },

    #[error("No active device link")]
    NoLink,

    #[error("Payload of {len} bytes exceeds device maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

impl Sr86xError {
    /// Whether this error came from the byte stream rather than the peer
    pub fn is_transport(&self) -> bool {
        matches!(self, Sr86xError::Connection(_) | Sr86xError::Timeout)
    }
}

/// Result type alias for SR86x operations
pub type Sr86xResult<T> = Result<T, Sr86xError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let io = Sr86xError::Connection(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        assert!(io.is_transport());
        assert!(Sr86xError::Timeout.is_transport());
        assert!(!Sr86xError::NoLink.is_transport());
    }

    #[test]
    fn test_reply_error_converts() {
        let err: Sr86xError = ReplyError::NotReply(0).into();
        assert!(matches!(err, Sr86xError::Rpc(ReplyError::NotReply(0))));
    }
}
