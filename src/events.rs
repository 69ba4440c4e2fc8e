//! Transaction events recorded in the journal

use serde::{Deserialize, Serialize};

use super::{BookingRequest, StepError, TransactionResult};

/// Events appended by the coordinator while driving a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransactionEvent {
    /// Request accepted, before any step runs
    TransactionStarted {
        request: BookingRequest,
        started_at_millis: u64,
    },
    /// A forward step committed
    StepCompleted {
        step_index: usize,
        step: Box<str>,
        confirmation: Box<str>,
        completed_at_millis: u64,
    },
    /// A forward step failed for good
    StepFailed {
        step_index: usize,
        step: Box<str>,
        error: StepError,
        failed_at_millis: u64,
    },
    /// A compensation succeeded
    CompensationCompleted {
        step: Box<str>,
        completed_at_millis: u64,
    },
    /// A compensation failed; rollback went on
    CompensationFailed {
        step: Box<str>,
        error: Box<str>,
        failed_at_millis: u64,
    },
    /// Every step committed
    TransactionCompleted {
        confirmation: Box<str>,
        completed_at_millis: u64,
    },
    /// Rollback finished
    TransactionRolledBack {
        result: TransactionResult,
        rolled_back_at_millis: u64,
    },
}

impl TransactionEvent {
    /// Stable name used in logs
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TransactionStarted { .. } => "transaction_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::CompensationCompleted { .. } => "compensation_completed",
            Self::CompensationFailed { .. } => "compensation_failed",
            Self::TransactionCompleted { .. } => "transaction_completed",
            Self::TransactionRolledBack { .. } => "transaction_rolled_back",
        }
    }

    /// Whether this event ends the transaction
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TransactionCompleted { .. } | Self::TransactionRolledBack { .. }
        )
    }
}
