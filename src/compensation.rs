//! Compensation stack
//!
//! ```text
//! Forward:      [car] → [hotel] → [flight ✗]
//! Stack:        push(cancel_car), push(cancel_hotel)
//! Rollback:     cancel_hotel → cancel_car      (LIFO)
//! ```
//!
//! An entry is pushed only once its forward step has committed, so the stack
//! always holds exactly the effects that are applied and not yet undone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    ActivityOptions, BookingRequest, CompensationError, SagaContext, SagaObserver, TaskExecutor,
};

/// Undo action owed for one committed step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationEntry {
    /// Step that committed
    pub step: Box<str>,
    /// Index of the step in forward order
    pub step_index: usize,
    /// Activity that undoes the step
    pub activity: Box<str>,
    /// Original request, passed unchanged to the undo activity
    pub request: Arc<BookingRequest>,
}

/// Result of undoing one entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompensationOutcome {
    /// Step whose effect was undone
    pub step: Box<str>,
    /// Compensation activity that ran
    pub activity: Box<str>,
    /// Confirmation, or why the undo failed
    pub result: Result<String, CompensationError>,
}

/// Outcome of draining the stack, in the order compensations ran
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// One outcome per compensation, in the order they ran
    pub outcomes: Vec<CompensationOutcome>,
}

impl RollbackReport {
    /// Whether every compensation succeeded
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// First compensation failure, if any
    pub fn first_error(&self) -> Option<&CompensationError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }

    /// Steps compensated, in execution order
    pub fn steps(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| &*o.step).collect()
    }
}

/// Ordered list of pending undo actions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationStack {
    entries: Vec<CompensationEntry>,
}

impl CompensationStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the undo action of a step that just committed
    pub fn push(
        &mut self,
        step: &str,
        step_index: usize,
        activity: &str,
        request: Arc<BookingRequest>,
    ) {
        self.entries.push(CompensationEntry {
            step: step.into(),
            step_index,
            activity: activity.into(),
            request,
        });
    }

    /// Number of pending compensations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is left to undo
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries, oldest first
    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    /// Drop the entry of a step whose compensation already ran
    pub(crate) fn remove_step(&mut self, step: &str) -> Option<CompensationEntry> {
        let pos = self.entries.iter().rposition(|e| &*e.step == step)?;
        Some(self.entries.remove(pos))
    }

    /// Invoke every entry in LIFO order, each as a single attempt bounded by
    /// `options`. A failed compensation is recorded and rollback continues
    /// with the remaining entries.
    pub async fn drain<E>(
        self,
        executor: &E,
        context: &SagaContext,
        options: &ActivityOptions,
        observer: &dyn SagaObserver,
    ) -> RollbackReport
    where
        E: TaskExecutor + ?Sized,
    {
        let mut report = RollbackReport::default();

        for entry in self.entries.into_iter().rev() {
            let ctx = context.for_compensation(&entry.step, entry.step_index);
            observer.on_compensation_started(&ctx, &entry.step);

            let result = executor
                .execute_activity(&ctx, &entry.activity, &entry.request, options)
                .await
                .map_err(|e| CompensationError::from_step_error(&entry.step, e));

            match &result {
                Ok(_) => observer.on_compensation_completed(&ctx, &entry.step),
                Err(e) => observer.on_compensation_failed(&ctx, &entry.step, &e.to_string()),
            }

            report.outcomes.push(CompensationOutcome {
                step: entry.step,
                activity: entry.activity,
                result,
            });
        }

        report
    }
}
