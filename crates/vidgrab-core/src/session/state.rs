//! Session lifecycle as a tagged state with checked transitions.

use std::fmt;

use crate::error_code::ErrorCode;

/// Why an item was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// General retry ceiling reached.
    RetryCeiling,
    /// Quality detection exhausted (or forced exhausted by a frame error).
    QualityDetectionExhausted,
    /// A terminal error code; no retry is attempted.
    Terminal(ErrorCode),
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::RetryCeiling => f.write_str("retry ceiling reached"),
            AbandonReason::QualityDetectionExhausted => {
                f.write_str("quality detection exhausted")
            }
            AbandonReason::Terminal(code) => write!(f, "terminal error {}", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Negotiating,
    AwaitingSizeProbe,
    Transferring,
    Finalizing,
    Done,
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Abandoned(_))
    }

    fn allows(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (Done | Abandoned(_), _) => false,
            (_, Abandoned(_)) => true,
            (Finalizing, Done) => true,
            (Finalizing, _) | (_, Done) | (_, Idle) => false,
            (_, Finalizing) => true,
            (Idle, Negotiating) => true,
            (Idle, _) => false,
            // Retry after any failure.
            (_, Negotiating) => true,
            // Secondary video follows the primary transfer.
            (Negotiating | Transferring, AwaitingSizeProbe) => true,
            (Negotiating | AwaitingSizeProbe | Transferring, Transferring) => true,
            _ => false,
        }
    }

    /// The state after moving to `to`, or the rejected pair.
    pub fn transition(self, to: SessionState) -> Result<SessionState, IllegalTransition> {
        if self.allows(to) {
            Ok(to)
        } else {
            Err(IllegalTransition { from: self, to })
        }
    }
}
