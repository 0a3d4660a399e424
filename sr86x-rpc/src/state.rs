//! Per-connection call state machine

use sr86x_core::{Sr86xError, Sr86xResult};

/// State of the call currently held by an [`RpcServer`](crate::RpcServer)
///
/// # State Transitions
/// ```text
/// Idle -> FirstExecution     (valid call header, procedure != 0)
/// Idle -> ResponsePending    (invalid header or null procedure)
/// FirstExecution -> ExecutionPending | ResponsePending
/// ExecutionPending -> ExecutionPending | ResponsePending
/// ResponsePending -> Idle    (whole reply acknowledged)
/// ```
///
/// Any state may drop back to `Idle` on connect, close, abort or timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    /// Waiting for the next call record
    #[default]
    Idle,
    /// Header accepted, handler about to run for the first time
    FirstExecution,
    /// Handler ran but has not produced a response yet
    ExecutionPending,
    /// A reply is armed and being sent
    ResponsePending,
}

impl CallState {
    /// Whether the handler still has to run for the current call
    pub fn is_executing(&self) -> bool {
        matches!(
            self,
            CallState::FirstExecution | CallState::ExecutionPending
        )
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - `Idle` -> `FirstExecution` | `ResponsePending`
    /// - `FirstExecution` / `ExecutionPending` -> `ExecutionPending` | `ResponsePending`
    /// - `ResponsePending` -> `Idle`
    /// - anything -> `Idle` (reset)
    pub fn validate_transition(&self, new_state: CallState) -> Sr86xResult<()> {
        use CallState::*;
        let valid = match (*self, new_state) {
            (_, Idle) => true,
            (Idle, FirstExecution) | (Idle, ResponsePending) => true,
            (FirstExecution | ExecutionPending, ExecutionPending) => true,
            (FirstExecution | ExecutionPending, ResponsePending) => true,
            // a response may be replaced before it is sent
            (ResponsePending, ResponsePending) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Sr86xError::InvalidData(format!(
                "Invalid call state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::FirstExecution => "FirstExecution",
            CallState::ExecutionPending => "ExecutionPending",
            CallState::ResponsePending => "ResponsePending",
        }
    }
}
