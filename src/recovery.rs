//! Rebuild unfinished transactions from the journal
//!
//! A transaction is unfinished when its journal has no terminal event. The
//! forward steps that committed are replayed into a fresh compensation
//! stack; compensations already journaled are removed from it so they are
//! not run twice.

use std::sync::Arc;

use crate::booking::BOOKING_STEPS;
use crate::{
    BookingRequest, CompensationStack, JournalEntry, JournalError, StepError, TransactionEvent,
    TransactionId, TransactionJournal,
};

/// Where an interrupted transaction picks up
#[derive(Clone, Debug, PartialEq)]
pub enum RecoveryPhase {
    /// Forward sequence still running
    Forward {
        /// Index of the first step not yet committed
        next_step: usize,
        /// Confirmations of the committed steps
        confirmations: Vec<Box<str>>,
    },
    /// A step failed; pending compensations still owed
    RollingBack {
        /// Step whose failure started the rollback
        failed_step: Box<str>,
        /// Its final error
        error: StepError,
    },
}

/// State of an interrupted transaction
#[derive(Clone, Debug)]
pub struct RecoveryPoint {
    /// Transaction to resume
    pub transaction_id: TransactionId,
    /// Original request
    pub request: Arc<BookingRequest>,
    /// When the transaction first started
    pub started_at_millis: u64,
    /// Compensations still owed
    pub compensations: CompensationStack,
    /// Where to pick up
    pub phase: RecoveryPhase,
}

/// Replay one transaction's journal. Returns `None` when the transaction
/// reached a terminal event or never recorded its start.
pub fn rebuild_transaction(
    transaction_id: &TransactionId,
    entries: &[JournalEntry],
) -> Option<RecoveryPoint> {
    let mut entries: Vec<&JournalEntry> = entries.iter().collect();
    entries.sort_by_key(|e| e.sequence);

    let mut request: Option<Arc<BookingRequest>> = None;
    let mut started_at_millis = 0;
    let mut compensations = CompensationStack::new();
    let mut next_step = 0;
    let mut confirmations = Vec::new();
    let mut failure: Option<(Box<str>, StepError)> = None;

    for entry in entries {
        match &entry.event {
            TransactionEvent::TransactionStarted {
                request: r,
                started_at_millis: at,
            } => {
                request = Some(Arc::new(r.clone()));
                started_at_millis = *at;
            }
            TransactionEvent::StepCompleted {
                step_index,
                confirmation,
                ..
            } => {
                let req = request.as_ref()?;
                let step = BOOKING_STEPS.get(*step_index)?;
                compensations.push(step.name, *step_index, step.compensation, req.clone());
                confirmations.push(confirmation.clone());
                next_step = step_index + 1;
            }
            TransactionEvent::StepFailed { step, error, .. } => {
                failure = Some((step.clone(), error.clone()));
            }
            TransactionEvent::CompensationCompleted { step, .. }
            | TransactionEvent::CompensationFailed { step, .. } => {
                compensations.remove_step(step);
            }
            TransactionEvent::TransactionCompleted { .. }
            | TransactionEvent::TransactionRolledBack { .. } => return None,
        }
    }

    let phase = match failure {
        Some((failed_step, error)) => RecoveryPhase::RollingBack { failed_step, error },
        None => RecoveryPhase::Forward {
            next_step,
            confirmations,
        },
    };

    Some(RecoveryPoint {
        transaction_id: transaction_id.clone(),
        request: request?,
        started_at_millis,
        compensations,
        phase,
    })
}

/// Every unfinished transaction in `journal`
pub fn recover_transactions(
    journal: &dyn TransactionJournal,
) -> Result<Vec<RecoveryPoint>, JournalError> {
    let mut points = Vec::new();
    for id in journal.list_transactions()? {
        let entries = journal.read(&id)?;
        if let Some(point) = rebuild_transaction(&id, &entries) {
            points.push(point);
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryJournal, TransactionResult};

    fn request() -> BookingRequest {
        BookingRequest::new("jane-123456", "C1", "H1", "F1", 2).unwrap()
    }

    fn started(journal: &InMemoryJournal, id: &TransactionId) {
        journal
            .append(
                id,
                TransactionEvent::TransactionStarted {
                    request: request(),
                    started_at_millis: 10,
                },
            )
            .unwrap();
    }

    fn step_completed(journal: &InMemoryJournal, id: &TransactionId, index: usize) {
        let step = BOOKING_STEPS[index];
        journal
            .append(
                id,
                TransactionEvent::StepCompleted {
                    step_index: index,
                    step: step.name.into(),
                    confirmation: format!("Booked {}", step.name).into(),
                    completed_at_millis: 11,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_forward_recovery_point() {
        let journal = InMemoryJournal::new();
        let id = TransactionId::new("jane-123456");
        started(&journal, &id);
        step_completed(&journal, &id, 0);

        let points = recover_transactions(&journal).unwrap();
        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.started_at_millis, 10);
        assert_eq!(point.compensations.len(), 1);
        assert_eq!(&*point.compensations.entries()[0].activity, "cancel_car");
        assert_eq!(
            point.phase,
            RecoveryPhase::Forward {
                next_step: 1,
                confirmations: vec!["Booked car".into()],
            }
        );
    }

    #[test]
    fn test_rollback_skips_finished_compensations() {
        let journal = InMemoryJournal::new();
        let id = TransactionId::new("jane-123456");
        started(&journal, &id);
        step_completed(&journal, &id, 0);
        step_completed(&journal, &id, 1);
        journal
            .append(
                &id,
                TransactionEvent::StepFailed {
                    step_index: 2,
                    step: "flight".into(),
                    error: StepError::non_retryable("sold out"),
                    failed_at_millis: 12,
                },
            )
            .unwrap();
        journal
            .append(
                &id,
                TransactionEvent::CompensationCompleted {
                    step: "hotel".into(),
                    completed_at_millis: 13,
                },
            )
            .unwrap();

        let point = rebuild_transaction(&id, &journal.read(&id).unwrap()).unwrap();
        assert_eq!(point.compensations.len(), 1);
        assert_eq!(&*point.compensations.entries()[0].step, "car");
        assert!(matches!(
            point.phase,
            RecoveryPhase::RollingBack { ref failed_step, .. } if &**failed_step == "flight"
        ));
    }

    #[test]
    fn test_terminal_transactions_are_skipped() {
        let journal = InMemoryJournal::new();
        let id = TransactionId::new("jane-123456");
        started(&journal, &id);
        journal
            .append(
                &id,
                TransactionEvent::TransactionRolledBack {
                    result: TransactionResult::Cancelled,
                    rolled_back_at_millis: 20,
                },
            )
            .unwrap();

        assert!(recover_transactions(&journal).unwrap().is_empty());
    }

    #[test]
    fn test_missing_start_is_skipped() {
        let id = TransactionId::new("orphan");
        let entries = vec![JournalEntry {
            sequence: 1,
            recorded_at_millis: 0,
            event: TransactionEvent::CompensationCompleted {
                step: "car".into(),
                completed_at_millis: 0,
            },
        }];
        assert!(rebuild_transaction(&id, &entries).is_none());
    }
}
