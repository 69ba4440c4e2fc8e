//! Saga runtime statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the executor and the coordinator
pub struct SagaStats {
    /// Transactions accepted by the coordinator
    pub transactions_started: AtomicU64,
    /// Transactions that committed every step
    pub transactions_completed: AtomicU64,
    /// Transactions rolled back
    pub transactions_cancelled: AtomicU64,
    /// Activity attempts, forward steps only
    pub activity_attempts: AtomicU64,
    /// Attempts followed by a retry
    pub activity_retries: AtomicU64,
    /// Attempts that failed
    pub activity_failures: AtomicU64,
    /// Compensations run during rollbacks
    pub compensations_started: AtomicU64,
    /// Compensations that failed
    pub compensations_failed: AtomicU64,
}

impl SagaStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self {
            transactions_started: AtomicU64::new(0),
            transactions_completed: AtomicU64::new(0),
            transactions_cancelled: AtomicU64::new(0),
            activity_attempts: AtomicU64::new(0),
            activity_retries: AtomicU64::new(0),
            activity_failures: AtomicU64::new(0),
            compensations_started: AtomicU64::new(0),
            compensations_failed: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> SagaStatsSnapshot {
        SagaStatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_completed: self.transactions_completed.load(Ordering::Relaxed),
            transactions_cancelled: self.transactions_cancelled.load(Ordering::Relaxed),
            activity_attempts: self.activity_attempts.load(Ordering::Relaxed),
            activity_retries: self.activity_retries.load(Ordering::Relaxed),
            activity_failures: self.activity_failures.load(Ordering::Relaxed),
            compensations_started: self.compensations_started.load(Ordering::Relaxed),
            compensations_failed: self.compensations_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for SagaStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`SagaStats`], served on `/stats`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SagaStatsSnapshot {
    /// Transactions accepted by the coordinator
    pub transactions_started: u64,
    /// Transactions that committed every step
    pub transactions_completed: u64,
    /// Transactions rolled back
    pub transactions_cancelled: u64,
    /// Activity attempts, forward steps only
    pub activity_attempts: u64,
    /// Attempts followed by a retry
    pub activity_retries: u64,
    /// Attempts that failed
    pub activity_failures: u64,
    /// Compensations run during rollbacks
    pub compensations_started: u64,
    /// Compensations that failed
    pub compensations_failed: u64,
}
