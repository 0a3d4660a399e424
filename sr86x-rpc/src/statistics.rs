//! RPC server statistics

/// Counters kept by an [`RpcServer`](crate::RpcServer)
///
/// Statistics survive connection resets; call [`clear`](Self::clear) to
/// start over.
#[derive(Debug, Clone, Default)]
pub struct RpcStatistics {
    /// Complete records handed to the call engine
    pub records_received: u64,
    /// Replies fully acknowledged by the transport
    pub replies_sent: u64,
    /// Records dropped for exceeding the receive buffer
    pub records_dropped: u64,
    /// Calls answered with a protocol error
    pub error_replies: u64,
    /// Records that were not calls and got no reply
    pub ignored_messages: u64,
}

impl RpcStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_records_received(&mut self) {
        self.records_received += 1;
    }

    pub fn increment_replies_sent(&mut self) {
        self.replies_sent += 1;
    }

    pub fn increment_records_dropped(&mut self) {
        self.records_dropped += 1;
    }

    pub fn increment_error_replies(&mut self) {
        self.error_replies += 1;
    }

    pub fn increment_ignored_messages(&mut self) {
        self.ignored_messages += 1;
    }

    /// Share of received records that did not execute, as a percentage
    ///
    /// Returns 0.0 if nothing has been received.
    pub fn error_rate(&self) -> f64 {
        let failed = self.error_replies + self.ignored_messages + self.records_dropped;
        let total = self.records_received + self.records_dropped;
        if total == 0 {
            0.0
        } else {
            (failed as f64 / total as f64) * 100.0
        }
    }
}
