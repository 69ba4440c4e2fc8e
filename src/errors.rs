//! Error types for step execution, compensation and the saga runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification of a forward-step failure, used by retry policies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum FailureKind {
    /// Transient failure, retried under the step's policy
    #[error("retryable")]
    Retryable,
    /// Invalid caller-supplied data or another permanent failure
    #[error("non_retryable")]
    NonRetryable,
    /// The attempt exceeded its start-to-close timeout
    #[error("timeout")]
    Timeout,
}

/// Error from a single activity attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StepError {
    /// Temporary error - can retry with backoff
    #[error("{reason}")]
    Retryable {
        /// Error description
        reason: Box<str>,
    },
    /// Permanent error - abort the forward sequence without retrying
    #[error("{reason}")]
    NonRetryable {
        /// Error description
        reason: Box<str>,
    },
    /// The attempt did not finish within its start-to-close timeout
    #[error("activity timed out after {after:?}")]
    Timeout {
        /// Timeout that elapsed
        after: Duration,
    },
}

impl StepError {
    /// Build a retryable error
    pub fn retryable(reason: impl Into<Box<str>>) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    /// Build a non-retryable error
    pub fn non_retryable(reason: impl Into<Box<str>>) -> Self {
        Self::NonRetryable {
            reason: reason.into(),
        }
    }

    /// Failure classification of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Retryable { .. } => FailureKind::Retryable,
            Self::NonRetryable { .. } => FailureKind::NonRetryable,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }

    /// Check if this error is retryable on its own terms
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NonRetryable { .. })
    }
}

/// Error from a compensation call during rollback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CompensationError {
    /// The undo operation reported a failure
    #[error("compensation of {step} failed: {reason}")]
    Failed {
        /// Step whose effect could not be undone
        step: Box<str>,
        /// Error description
        reason: Box<str>,
    },
    /// The undo operation did not finish within its timeout
    #[error("compensation of {step} timed out after {after:?}")]
    TimedOut {
        /// Step whose effect could not be undone
        step: Box<str>,
        /// Timeout that elapsed
        after: Duration,
    },
}

impl CompensationError {
    /// Wrap the error returned by the undo activity of `step`
    pub fn from_step_error(step: &str, error: StepError) -> Self {
        match error {
            StepError::Timeout { after } => Self::TimedOut {
                step: step.into(),
                after,
            },
            StepError::Retryable { reason } | StepError::NonRetryable { reason } => Self::Failed {
                step: step.into(),
                reason,
            },
        }
    }

    /// Step the failed compensation belongs to
    pub fn step(&self) -> &str {
        match self {
            Self::Failed { step, .. } | Self::TimedOut { step, .. } => step,
        }
    }
}

/// Errors raised by the client, worker and gateway around a transaction
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// The transaction id was already submitted
    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(crate::TransactionId),
    /// Another worker already claimed the queue
    #[error("Task queue already polled by a worker: {0}")]
    QueueAlreadyPolled(Box<str>),
    /// A booking activity is missing from the executor
    #[error("Activity not registered: {0}")]
    ActivityNotRegistered(Box<str>),
    /// The worker stopped before replying
    #[error("Worker dropped transaction {0} before completing it")]
    WorkerGone(crate::TransactionId),
    /// The client was disconnected
    #[error("Client is disconnected")]
    Disconnected,
    /// The request breaks a booking invariant
    #[error("Invalid booking request: {0}")]
    InvalidRequest(Box<str>),
    /// Transaction id store failure
    #[error(transparent)]
    Dedupe(#[from] crate::DedupeError),
}
