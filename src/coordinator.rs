//! Saga coordinator for the book_vacation transaction
//!
//! Drives car, hotel and flight strictly in sequence. Each committed step
//! registers its cancellation; the first terminal failure stops the forward
//! sequence and the registered cancellations run in reverse order. The
//! coordinator never returns an error: every outcome is a
//! [`TransactionResult`].

use std::sync::Arc;

use crate::booking::{AttemptBudget, BookingStep, SAGA_TYPE};
use crate::recovery::{RecoveryPhase, RecoveryPoint};
use crate::state::{Compensating, Executing, Transaction};
use crate::stats::SagaStats;
use crate::{
    ActivityOptions, BookingRequest, InMemoryJournal, RetryPolicy, SagaConfig, SagaContext,
    SagaObserver, StepError, TaskExecutor, TracingObserver, TransactionEvent, TransactionId,
    TransactionJournal, TransactionResult,
};

/// Coordinator of the three-step booking saga
pub struct BookingSaga<E: TaskExecutor + ?Sized> {
    executor: Arc<E>,
    journal: Arc<dyn TransactionJournal>,
    observer: Arc<dyn SagaObserver>,
    stats: Arc<SagaStats>,
    config: SagaConfig,
}

impl<E: TaskExecutor + ?Sized> BookingSaga<E> {
    /// Coordinator with an in-memory journal and tracing observer
    pub fn new(executor: Arc<E>, config: SagaConfig) -> Self {
        Self {
            executor,
            journal: Arc::new(InMemoryJournal::new()),
            observer: Arc::new(TracingObserver),
            stats: Arc::new(SagaStats::new()),
            config,
        }
    }

    /// Journal transitions to `journal`
    pub fn with_journal(mut self, journal: Arc<dyn TransactionJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Report lifecycle hooks to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Count transactions in `stats`
    pub fn with_stats(mut self, stats: Arc<SagaStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Executor running the activities
    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Journal of unfinished transactions
    pub fn journal(&self) -> &Arc<dyn TransactionJournal> {
        &self.journal
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<SagaStats> {
        &self.stats
    }

    /// Active configuration
    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Options for the forward activity of `step`
    pub fn step_options(&self, step: &BookingStep, request: &BookingRequest) -> ActivityOptions {
        let policy = match step.budget {
            AttemptBudget::Unbounded => self.config.default_retry_policy.clone(),
            AttemptBudget::CallerBounded => RetryPolicy::constant(
                self.config.flight_retry_interval,
                request.max_flight_attempts,
            )
            .with_non_retryable_kinds(self.config.default_retry_policy.non_retryable_kinds.clone()),
        };
        ActivityOptions::new(self.config.step_timeout).with_retry_policy(policy)
    }

    /// Options for every compensation: one attempt, bounded by its timeout
    pub fn compensation_options(&self) -> ActivityOptions {
        ActivityOptions::new(self.config.compensation_timeout)
    }

    /// Run one booking transaction to its terminal result
    pub async fn run(&self, request: BookingRequest) -> TransactionResult {
        let request = Arc::new(request);
        let context = SagaContext::new(request.transaction_id(), SAGA_TYPE);

        SagaStats::incr(&self.stats.transactions_started);
        self.observer.on_transaction_started(&context);
        self.record(
            &context.transaction_id,
            TransactionEvent::TransactionStarted {
                request: (*request).clone(),
                started_at_millis: context.started_at_millis,
            },
        );

        let transaction = Transaction::new(context, request);
        if let Err(e) = transaction.request.validate() {
            let now = SagaContext::now_millis();
            let error = StepError::non_retryable(e.to_string());
            tracing::warn!(
                transaction_id = %transaction.context.transaction_id,
                error = %error,
                "Rejecting invalid booking request"
            );
            self.record(
                &transaction.context.transaction_id,
                TransactionEvent::StepFailed {
                    step_index: 0,
                    step: "request".into(),
                    error: error.clone(),
                    failed_at_millis: now,
                },
            );
            let failing = transaction.fail("request", error, now);
            return self.roll_back(failing).await;
        }

        self.drive(transaction).await
    }

    /// Continue a transaction rebuilt from the journal
    pub async fn resume(&self, point: RecoveryPoint) -> TransactionResult {
        let mut context = SagaContext::new(point.transaction_id.clone(), SAGA_TYPE);
        context.started_at_millis = point.started_at_millis;
        let now = SagaContext::now_millis();

        tracing::info!(
            transaction_id = %point.transaction_id,
            pending_compensations = point.compensations.len(),
            "Resuming transaction"
        );

        match point.phase {
            RecoveryPhase::Forward {
                next_step,
                confirmations,
            } => {
                let transaction = Transaction::<Executing>::resume(
                    context,
                    point.request,
                    next_step,
                    confirmations,
                    point.compensations,
                    now,
                );
                self.drive(transaction).await
            }
            RecoveryPhase::RollingBack { failed_step, error } => {
                let transaction = Transaction::<Compensating>::resume(
                    context,
                    point.request,
                    failed_step,
                    error,
                    point.compensations,
                    now,
                );
                self.roll_back(transaction).await
            }
        }
    }

    async fn drive(&self, mut transaction: Transaction<Executing>) -> TransactionResult {
        while let Some(step) = transaction.current_step() {
            let step_index = transaction.state.next_step;
            let ctx = transaction.context.for_step(step.name, step_index);
            let options = self.step_options(step, &transaction.request);

            tracing::debug!(
                transaction_id = %ctx.transaction_id,
                step = %step.name,
                step_index,
                "Executing step"
            );

            match self
                .executor
                .execute_activity(&ctx, step.action, &transaction.request, &options)
                .await
            {
                Ok(confirmation) => {
                    let now = SagaContext::now_millis();
                    let confirmation = confirmation.into_boxed_str();
                    self.record(
                        &ctx.transaction_id,
                        TransactionEvent::StepCompleted {
                            step_index,
                            step: step.name.into(),
                            confirmation: confirmation.clone(),
                            completed_at_millis: now,
                        },
                    );
                    transaction = transaction.commit_step(step, confirmation, now);
                }
                Err(error) => {
                    let now = SagaContext::now_millis();
                    tracing::warn!(
                        transaction_id = %ctx.transaction_id,
                        step = %step.name,
                        error = %error,
                        "Step failed, starting rollback"
                    );
                    self.record(
                        &ctx.transaction_id,
                        TransactionEvent::StepFailed {
                            step_index,
                            step: step.name.into(),
                            error: error.clone(),
                            failed_at_millis: now,
                        },
                    );
                    let failing = transaction.fail(step.name, error, now);
                    return self.roll_back(failing).await;
                }
            }
        }

        let mut completed = transaction.complete(SagaContext::now_millis());
        completed.context.event_timestamp_millis = completed.last_updated_at_millis;
        self.record(
            &completed.context.transaction_id,
            TransactionEvent::TransactionCompleted {
                confirmation: completed.state.confirmation.clone(),
                completed_at_millis: completed.last_updated_at_millis,
            },
        );
        self.prune(&completed.context.transaction_id);
        SagaStats::incr(&self.stats.transactions_completed);
        self.observer.on_transaction_completed(&completed.context);
        completed.result()
    }

    async fn roll_back(&self, mut transaction: Transaction<Compensating>) -> TransactionResult {
        let pending = transaction.take_compensations();
        tracing::info!(
            transaction_id = %transaction.context.transaction_id,
            status = %transaction.status(),
            failed_step = %transaction.state.failed_step,
            pending = pending.len(),
            "Rolling back committed steps"
        );
        self.stats
            .compensations_started
            .fetch_add(pending.len() as u64, std::sync::atomic::Ordering::Relaxed);

        let report = pending
            .drain(
                self.executor.as_ref(),
                &transaction.context,
                &self.compensation_options(),
                self.observer.as_ref(),
            )
            .await;

        let now = SagaContext::now_millis();
        for outcome in &report.outcomes {
            let event = match &outcome.result {
                Ok(_) => TransactionEvent::CompensationCompleted {
                    step: outcome.step.clone(),
                    completed_at_millis: now,
                },
                Err(e) => {
                    SagaStats::incr(&self.stats.compensations_failed);
                    TransactionEvent::CompensationFailed {
                        step: outcome.step.clone(),
                        error: e.to_string().into(),
                        failed_at_millis: now,
                    }
                }
            };
            self.record(&transaction.context.transaction_id, event);
        }

        let mut rolled_back = transaction.rolled_back(report, now);
        rolled_back.context.event_timestamp_millis = now;
        let result = rolled_back.result(self.config.rollback_reporting);
        self.record(
            &rolled_back.context.transaction_id,
            TransactionEvent::TransactionRolledBack {
                result: result.clone(),
                rolled_back_at_millis: now,
            },
        );
        self.prune(&rolled_back.context.transaction_id);

        SagaStats::incr(&self.stats.transactions_cancelled);
        self.observer
            .on_transaction_cancelled(&rolled_back.context, &rolled_back.state.error.to_string());
        result
    }

    fn record(&self, transaction_id: &TransactionId, event: TransactionEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.journal.append(transaction_id, event) {
            tracing::warn!(
                transaction_id = %transaction_id,
                event = event_type,
                error = %e,
                "Failed to journal transaction event"
            );
        }
    }

    /// Drop the journal of a finished transaction
    fn prune(&self, transaction_id: &TransactionId) {
        if let Err(e) = self.journal.prune(transaction_id) {
            tracing::warn!(
                transaction_id = %transaction_id,
                error = %e,
                "Failed to prune transaction journal"
            );
        }
    }
}
