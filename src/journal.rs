//! Transaction journal storage trait

use super::{TransactionEvent, TransactionId};
use serde::{Deserialize, Serialize};

/// Journal storage trait
pub trait TransactionJournal: Send + Sync + 'static {
    /// Append `event` to the transaction's journal, returning its sequence number
    fn append(&self, transaction_id: &TransactionId, event: TransactionEvent) -> Result<u64, JournalError>;
    /// All entries of one transaction, oldest first
    fn read(&self, transaction_id: &TransactionId) -> Result<Vec<JournalEntry>, JournalError>;
    /// Ids of every transaction with journaled entries
    fn list_transactions(&self) -> Result<Vec<TransactionId>, JournalError>;
    /// Drop the entries of a finished transaction
    fn prune(&self, transaction_id: &TransactionId) -> Result<(), JournalError>;
}

/// One journaled event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Journal-wide sequence number
    pub sequence: u64,
    /// Wall-clock time the entry was written
    pub recorded_at_millis: u64,
    /// The recorded event
    pub event: TransactionEvent,
}

/// Journal storage failure
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The backing store failed
    #[error("Storage error: {0}")]
    Storage(Box<str>),
    /// No entries exist for the transaction
    #[error("Not found: {0}")]
    NotFound(TransactionId),
}

/// In-memory journal
pub struct InMemoryJournal {
    data: std::sync::RwLock<std::collections::HashMap<TransactionId, Vec<JournalEntry>>>,
    counter: std::sync::atomic::AtomicU64,
}

impl InMemoryJournal {
    /// Empty journal
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(std::collections::HashMap::new()),
            counter: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

impl TransactionJournal for InMemoryJournal {
    fn append(&self, transaction_id: &TransactionId, event: TransactionEvent) -> Result<u64, JournalError> {
        let seq = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let entry = JournalEntry {
            sequence: seq,
            recorded_at_millis: crate::SagaContext::now_millis(),
            event,
        };

        let mut data = self.data.write().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.entry(transaction_id.clone()).or_default().push(entry);

        Ok(seq)
    }

    fn read(&self, transaction_id: &TransactionId) -> Result<Vec<JournalEntry>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.get(transaction_id)
            .cloned()
            .ok_or_else(|| JournalError::NotFound(transaction_id.clone()))
    }

    fn list_transactions(&self) -> Result<Vec<TransactionId>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        let mut ids: Vec<_> = data.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn prune(&self, transaction_id: &TransactionId) -> Result<(), JournalError> {
        let mut data = self.data.write().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.remove(transaction_id);
        Ok(())
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}
