//! Transaction context and identity types

use serde::{Deserialize, Serialize};

use crate::IdempotencyKey;

/// Unique identifier for a booking transaction
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub Box<str>);

impl TransactionId {
    /// Create a new transaction ID
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Correlation context passed with every activity invocation
#[derive(Clone, Serialize, Deserialize)]
pub struct SagaContext {
    /// Transaction this invocation belongs to
    pub transaction_id: TransactionId,
    /// Type of saga (e.g., "book_vacation")
    pub saga_type: Box<str>,
    /// Name of the current step
    pub step_name: Box<str>,
    /// Index of this step in the workflow
    pub step_index: usize,
    /// Attempt number of the current invocation (1 = first attempt)
    pub attempt: u32,
    /// Whether this invocation undoes a committed step
    pub compensating: bool,
    /// ID of the invocation that caused this one
    pub causation_id: u64,
    /// Tracing ID of this invocation
    pub trace_id: u64,
    /// When the transaction started (millis since UNIX epoch)
    pub started_at_millis: u64,
    /// Timestamp of this invocation (millis since UNIX epoch)
    pub event_timestamp_millis: u64,
}

impl SagaContext {
    /// Create the root context of a transaction
    pub fn new(transaction_id: TransactionId, saga_type: impl Into<Box<str>>) -> Self {
        let now = Self::now_millis();
        Self {
            transaction_id,
            saga_type: saga_type.into(),
            step_name: "".into(),
            step_index: 0,
            attempt: 1,
            compensating: false,
            causation_id: 0,
            trace_id: Self::next_trace_id(),
            started_at_millis: now,
            event_timestamp_millis: now,
        }
    }

    /// Get current time in milliseconds since UNIX epoch
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Create a context for a forward step
    pub fn for_step(&self, step_name: &str, step_index: usize) -> Self {
        Self {
            step_name: step_name.into(),
            step_index,
            attempt: 1,
            compensating: false,
            causation_id: self.trace_id,
            trace_id: Self::next_trace_id(),
            event_timestamp_millis: Self::now_millis(),
            ..self.clone()
        }
    }

    /// Create a context for a retry attempt
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            trace_id: Self::next_trace_id(),
            event_timestamp_millis: Self::now_millis(),
            ..self.clone()
        }
    }

    /// Create a context for compensating the given step
    pub fn for_compensation(&self, step_name: &str, step_index: usize) -> Self {
        Self {
            step_name: step_name.into(),
            step_index,
            attempt: 1,
            compensating: true,
            causation_id: self.trace_id,
            trace_id: Self::next_trace_id(),
            event_timestamp_millis: Self::now_millis(),
            ..self.clone()
        }
    }

    /// Idempotency key for the current invocation
    pub fn idempotency_key(&self) -> IdempotencyKey {
        if self.compensating {
            IdempotencyKey::for_compensation(&self.transaction_id, &self.step_name)
        } else {
            IdempotencyKey::for_step(&self.transaction_id, &self.step_name, self.attempt)
        }
    }

    /// Calculate elapsed time since the transaction started
    pub fn elapsed_millis(&self) -> u64 {
        self.event_timestamp_millis
            .saturating_sub(self.started_at_millis)
    }

    fn next_trace_id() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SagaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext")
            .field("transaction_id", &self.transaction_id)
            .field("saga_type", &self.saga_type)
            .field("step_name", &self.step_name)
            .field("step_index", &self.step_index)
            .field("attempt", &self.attempt)
            .field("compensating", &self.compensating)
            .finish()
    }
}
