//! Transaction id deduplication storage trait

use super::TransactionId;

/// Deduplication storage trait
pub trait TransactionIdStore: Send + Sync + 'static {
    /// Mark `id` as in use; returns `false` if it already was
    fn check_and_mark(&self, id: &TransactionId) -> Result<bool, DedupeError>;
    /// Whether `id` is marked
    fn contains(&self, id: &TransactionId) -> bool;
    /// Unmark `id` so it can be submitted again
    fn release(&self, id: &TransactionId) -> Result<(), DedupeError>;
}

/// Dedupe storage failure
#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    /// The backing store failed
    #[error("Storage error: {0}")]
    Storage(Box<str>),
}

/// In-memory dedupe store
pub struct InMemoryDedupe {
    data: std::sync::RwLock<std::collections::HashSet<TransactionId>>,
}

impl InMemoryDedupe {
    /// Empty store
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(std::collections::HashSet::new()),
        }
    }
}

impl TransactionIdStore for InMemoryDedupe {
    fn check_and_mark(&self, id: &TransactionId) -> Result<bool, DedupeError> {
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        Ok(data.insert(id.clone()))
    }

    fn contains(&self, id: &TransactionId) -> bool {
        let data = self.data.read().ok();
        data.map(|d| d.contains(id)).unwrap_or(false)
    }

    fn release(&self, id: &TransactionId) -> Result<(), DedupeError> {
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        data.remove(id);
        Ok(())
    }
}

impl Default for InMemoryDedupe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_and_mark() {
        let dedupe = InMemoryDedupe::new();
        let id = TransactionId::new("jane-123456");

        assert!(dedupe.check_and_mark(&id).unwrap());
        assert!(!dedupe.check_and_mark(&id).unwrap());
        assert!(dedupe.contains(&id));

        dedupe.release(&id).unwrap();
        assert!(!dedupe.contains(&id));
        assert!(dedupe.check_and_mark(&id).unwrap());
    }
}
