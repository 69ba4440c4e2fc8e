//! Vacation booking SAGA
//!
//! Reserves a car, a hotel and a flight as one logical transaction. Every
//! committed reservation registers its cancellation; when a later step
//! fails for good, the registered cancellations run in reverse order and
//! the transaction is reported as cancelled.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Register the six booking activities
//! let mut registry = ActivityRegistry::new();
//! register_booking_activities(&mut registry, SimulatedServices::new());
//!
//! // 2. Build the coordinator and a worker for its task queue
//! let saga = Arc::new(BookingSaga::new(
//!     Arc::new(LocalExecutor::new(registry)),
//!     SagaConfig::default(),
//! ));
//! let client = SagaClient::connect(ClientConfig::default())?;
//! let worker = Worker::new(&client, DEFAULT_TASK_QUEUE, saga)?;
//! tokio::spawn(worker.run(std::future::pending()));
//!
//! // 3. Submit a transaction and wait for its result
//! let request = BookingRequest::new("jane-123456", "C1", "H1", "F1", 3)?;
//! let result = client.execute_transaction(DEFAULT_TASK_QUEUE, request).await?;
//! ```

#![warn(missing_docs)]

// === Core Types ===
mod booking;
mod context;
mod errors;
mod events;
mod idempotency;
mod retry;
mod state;

// === Traits ===
mod traits;

// === Execution ===
mod activity;
mod compensation;
mod coordinator;
mod executor;
/// Journal replay for crash recovery
pub mod recovery;

// === Storage ===
mod dedupe;
mod journal;

// === Observability ===
mod observer;
mod stats;

// === Runtime ===
mod activities;
mod client;
mod config;
/// HTTP gateway
pub mod gateway;
mod worker;

#[cfg(test)]
mod integration_tests;

// === Re-exports ===

// Types
pub use booking::{
    steps, AttemptBudget, BookingRequest, BookingStep, BookingSummary, RollbackReporting,
    RollbackStatus, TransactionResult, BOOKING_STEPS, CANCELLED_MARKER, SAGA_TYPE,
};
pub use context::{SagaContext, TransactionId};
pub use idempotency::IdempotencyKey;
pub use retry::{RetryDecision, RetryPolicy};

// State (typestate)
pub use state::{Compensating, Completed, Executing, RolledBack, Transaction, TransactionStatus};

// Events
pub use events::TransactionEvent;

// Errors
pub use errors::{CompensationError, FailureKind, SagaError, StepError};

// Traits
pub use traits::{Activity, TaskExecutor};

// Execution
pub use activity::{ActivityOptions, ActivityRegistry, DEFAULT_START_TO_CLOSE_TIMEOUT};
pub use compensation::{CompensationEntry, CompensationOutcome, CompensationStack, RollbackReport};
pub use coordinator::BookingSaga;
pub use executor::LocalExecutor;
pub use recovery::{recover_transactions, RecoveryPhase, RecoveryPoint};

// Storage
pub use dedupe::{DedupeError, InMemoryDedupe, TransactionIdStore};
pub use journal::{InMemoryJournal, JournalEntry, JournalError, TransactionJournal};

// Observability
pub use observer::{NoOpObserver, SagaObserver, TracingObserver};
pub use stats::{SagaStats, SagaStatsSnapshot};

// Runtime
pub use activities::{
    register_booking_activities, CancelActivity, ReserveActivity, Resource, SimulatedServices,
};
pub use client::{ClientConfig, SagaClient, WorkflowTask};
pub use config::{CliArgs, ReportingMode, SagaConfig, DEFAULT_TASK_QUEUE};
pub use worker::Worker;
