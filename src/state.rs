//! Typestate phases of a booking transaction
//!
//! The compensation stack only exists in the `Executing` and `Compensating`
//! phases. Completing a transaction drops it (every effect is kept), and
//! rolling back consumes it, so it can be drained at most once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::booking::{BookingStep, BOOKING_STEPS};
use crate::{
    BookingRequest, CompensationStack, RollbackReport, RollbackReporting, RollbackStatus,
    SagaContext, StepError, TransactionResult,
};

/// Typestate markers
pub mod markers {
    /// A transaction phase
    pub trait Phase: Send + 'static {
        /// Status reported while in this phase
        const STATUS: super::TransactionStatus;
    }
}

/// Coarse phase of a transaction, for logs and reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Forward steps running
    Executing,
    /// Every step committed
    Completed,
    /// Undoing committed steps
    Compensating,
    /// Rollback finished
    RolledBack,
}

impl TransactionStatus {
    /// Whether the transaction has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Compensating => write!(f, "compensating"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

// Phase types
/// Running the forward steps
pub struct Executing {
    /// Index into the step table
    pub next_step: usize,
    /// Confirmations of committed steps, in order
    pub confirmations: Vec<Box<str>>,
    /// Undo operations of committed steps
    pub compensations: CompensationStack,
}
/// Every step committed
pub struct Completed {
    /// Joined confirmations
    pub confirmation: Box<str>,
}
/// A step failed; undoing the committed ones
pub struct Compensating {
    /// Step that failed
    pub failed_step: Box<str>,
    /// Its final error
    pub error: StepError,
    /// Undo operations still pending
    pub compensations: CompensationStack,
}
/// Rollback finished
pub struct RolledBack {
    /// Step that failed
    pub failed_step: Box<str>,
    /// Its final error
    pub error: StepError,
    /// Outcome of every compensation
    pub report: RollbackReport,
}

impl markers::Phase for Executing {
    const STATUS: TransactionStatus = TransactionStatus::Executing;
}
impl markers::Phase for Completed {
    const STATUS: TransactionStatus = TransactionStatus::Completed;
}
impl markers::Phase for Compensating {
    const STATUS: TransactionStatus = TransactionStatus::Compensating;
}
impl markers::Phase for RolledBack {
    const STATUS: TransactionStatus = TransactionStatus::RolledBack;
}

/// Transaction container with typestate
pub struct Transaction<S: markers::Phase> {
    /// Correlation and timing
    pub context: SagaContext,
    /// Input shared with every activity
    pub request: Arc<BookingRequest>,
    /// Time of the last phase change
    pub last_updated_at_millis: u64,
    /// Phase-specific data
    pub state: S,
}

impl<S: markers::Phase> Transaction<S> {
    /// Status of the current phase
    pub fn status(&self) -> TransactionStatus {
        S::STATUS
    }
}

impl Transaction<Executing> {
    /// Fresh transaction at step 0 with nothing to undo
    pub fn new(context: SagaContext, request: Arc<BookingRequest>) -> Self {
        let now = context.started_at_millis;
        Self {
            context,
            request,
            last_updated_at_millis: now,
            state: Executing {
                next_step: 0,
                confirmations: Vec::new(),
                compensations: CompensationStack::new(),
            },
        }
    }

    /// Rebuild a transaction part way through its forward steps
    pub fn resume(
        context: SagaContext,
        request: Arc<BookingRequest>,
        next_step: usize,
        confirmations: Vec<Box<str>>,
        compensations: CompensationStack,
        now_millis: u64,
    ) -> Self {
        Self {
            context,
            request,
            last_updated_at_millis: now_millis,
            state: Executing {
                next_step,
                confirmations,
                compensations,
            },
        }
    }

    /// Next forward step, or `None` once all steps committed
    pub fn current_step(&self) -> Option<&'static BookingStep> {
        BOOKING_STEPS.get(self.state.next_step)
    }

    /// Record a successful step and register its compensation
    pub fn commit_step(mut self, step: &BookingStep, confirmation: Box<str>, now_millis: u64) -> Self {
        self.state.compensations.push(
            step.name,
            self.state.next_step,
            step.compensation,
            self.request.clone(),
        );
        self.state.confirmations.push(confirmation);
        self.state.next_step += 1;
        self.last_updated_at_millis = now_millis;
        self
    }

    /// Finish after the last step, dropping the compensations
    pub fn complete(self, now_millis: u64) -> Transaction<Completed> {
        Transaction {
            context: self.context,
            request: self.request,
            last_updated_at_millis: now_millis,
            state: Completed {
                confirmation: self.state.confirmations.join(" ").into_boxed_str(),
            },
        }
    }

    /// Stop the forward sequence and start rolling back
    pub fn fail(self, failed_step: &str, error: StepError, now_millis: u64) -> Transaction<Compensating> {
        Transaction {
            context: self.context,
            request: self.request,
            last_updated_at_millis: now_millis,
            state: Compensating {
                failed_step: failed_step.into(),
                error,
                compensations: self.state.compensations,
            },
        }
    }
}

impl Transaction<Compensating> {
    /// Rebuild a transaction whose rollback was interrupted
    pub fn resume(
        context: SagaContext,
        request: Arc<BookingRequest>,
        failed_step: Box<str>,
        error: StepError,
        compensations: CompensationStack,
        now_millis: u64,
    ) -> Self {
        Self {
            context,
            request,
            last_updated_at_millis: now_millis,
            state: Compensating {
                failed_step,
                error,
                compensations,
            },
        }
    }

    /// Move the pending compensations out for draining
    pub fn take_compensations(&mut self) -> CompensationStack {
        std::mem::take(&mut self.state.compensations)
    }

    /// Finish the rollback with its report
    pub fn rolled_back(self, report: RollbackReport, now_millis: u64) -> Transaction<RolledBack> {
        Transaction {
            context: self.context,
            request: self.request,
            last_updated_at_millis: now_millis,
            state: RolledBack {
                failed_step: self.state.failed_step,
                error: self.state.error,
                report,
            },
        }
    }
}

impl Transaction<Completed> {
    /// Success result with the joined confirmations
    pub fn result(&self) -> TransactionResult {
        TransactionResult::Success {
            confirmation: self.state.confirmation.clone(),
        }
    }
}

impl Transaction<RolledBack> {
    /// Cancelled result, shaped by `reporting`
    pub fn result(&self, reporting: RollbackReporting) -> TransactionResult {
        match reporting {
            RollbackReporting::Lenient => TransactionResult::Cancelled,
            RollbackReporting::Strict => {
                let rollback = match self.state.report.first_error() {
                    None => RollbackStatus::RolledBack,
                    Some(e) => RollbackStatus::RollbackFailed {
                        compensation_error: e.to_string().into(),
                    },
                };
                TransactionResult::Failed {
                    rollback,
                    error: self.state.error.to_string().into(),
                }
            }
        }
    }
}
