//! Idempotency key generation for booking activities

use crate::TransactionId;
use serde::{Deserialize, Serialize};

/// Idempotency key for deduplicating remote side effects
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Box<str>);

impl IdempotencyKey {
    /// Create an idempotency key for a forward step attempt
    pub fn for_step(transaction_id: &TransactionId, step_name: &str, attempt: u32) -> Self {
        Self(
            format!("saga:{}:step:{}:attempt:{}", transaction_id, step_name, attempt)
                .into_boxed_str(),
        )
    }

    /// Create an idempotency key for compensation
    pub fn for_compensation(transaction_id: &TransactionId, step_name: &str) -> Self {
        Self(format!("saga:{}:compensate:{}", transaction_id, step_name).into_boxed_str())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
