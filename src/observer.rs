//! Saga observer trait

use std::time::Duration;

use super::SagaContext;

/// Observer trait for external observability
pub trait SagaObserver: Send + Sync + 'static {
    /// A transaction was accepted
    fn on_transaction_started(&self, context: &SagaContext);
    /// An activity attempt is starting
    fn on_step_started(&self, context: &SagaContext, activity: &str);
    /// An activity attempt succeeded
    fn on_step_completed(&self, context: &SagaContext, activity: &str, duration_millis: u64);
    /// An attempt failed and will be retried after `delay`
    fn on_step_retry(&self, context: &SagaContext, activity: &str, error: &str, delay: Duration);
    /// An activity failed for good
    fn on_step_failed(&self, context: &SagaContext, activity: &str, error: &str);
    /// A compensation is starting
    fn on_compensation_started(&self, context: &SagaContext, step: &str);
    /// A compensation succeeded
    fn on_compensation_completed(&self, context: &SagaContext, step: &str);
    /// A compensation failed
    fn on_compensation_failed(&self, context: &SagaContext, step: &str, error: &str);
    /// Every step committed
    fn on_transaction_completed(&self, context: &SagaContext);
    /// The transaction was rolled back
    fn on_transaction_cancelled(&self, context: &SagaContext, reason: &str);
}

/// No-op observer
pub struct NoOpObserver;

impl SagaObserver for NoOpObserver {
    fn on_transaction_started(&self, _context: &SagaContext) {}
    fn on_step_started(&self, _context: &SagaContext, _activity: &str) {}
    fn on_step_completed(&self, _context: &SagaContext, _activity: &str, _duration_millis: u64) {}
    fn on_step_retry(&self, _context: &SagaContext, _activity: &str, _error: &str, _delay: Duration) {}
    fn on_step_failed(&self, _context: &SagaContext, _activity: &str, _error: &str) {}
    fn on_compensation_started(&self, _context: &SagaContext, _step: &str) {}
    fn on_compensation_completed(&self, _context: &SagaContext, _step: &str) {}
    fn on_compensation_failed(&self, _context: &SagaContext, _step: &str, _error: &str) {}
    fn on_transaction_completed(&self, _context: &SagaContext) {}
    fn on_transaction_cancelled(&self, _context: &SagaContext, _reason: &str) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl SagaObserver for TracingObserver {
    fn on_transaction_started(&self, context: &SagaContext) {
        tracing::info!(transaction_id = %context.transaction_id, saga_type = %context.saga_type, "Transaction started");
    }

    fn on_step_started(&self, context: &SagaContext, activity: &str) {
        tracing::debug!(transaction_id = %context.transaction_id, activity = %activity, attempt = context.attempt, "Activity attempt started");
    }

    fn on_step_completed(&self, context: &SagaContext, activity: &str, duration_millis: u64) {
        tracing::info!(transaction_id = %context.transaction_id, activity = %activity, attempt = context.attempt, duration_ms = duration_millis, "Activity completed");
    }

    fn on_step_retry(&self, context: &SagaContext, activity: &str, error: &str, delay: Duration) {
        tracing::warn!(transaction_id = %context.transaction_id, activity = %activity, attempt = context.attempt, error = %error, delay_ms = delay.as_millis() as u64, "Activity failed, retrying");
    }

    fn on_step_failed(&self, context: &SagaContext, activity: &str, error: &str) {
        tracing::warn!(transaction_id = %context.transaction_id, activity = %activity, attempt = context.attempt, error = %error, "Activity failed");
    }

    fn on_compensation_started(&self, context: &SagaContext, step: &str) {
        tracing::info!(transaction_id = %context.transaction_id, step = %step, "Compensation started");
    }

    fn on_compensation_completed(&self, context: &SagaContext, step: &str) {
        tracing::info!(transaction_id = %context.transaction_id, step = %step, "Compensation completed");
    }

    fn on_compensation_failed(&self, context: &SagaContext, step: &str, error: &str) {
        tracing::error!(transaction_id = %context.transaction_id, step = %step, error = %error, "Compensation failed");
    }

    fn on_transaction_completed(&self, context: &SagaContext) {
        tracing::info!(transaction_id = %context.transaction_id, elapsed_ms = context.elapsed_millis(), "Transaction completed");
    }

    fn on_transaction_cancelled(&self, context: &SagaContext, reason: &str) {
        tracing::warn!(transaction_id = %context.transaction_id, reason = %reason, "Transaction cancelled");
    }
}
