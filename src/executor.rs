//! In-process task executor
//!
//! Runs registered activities on the current tokio runtime. Each attempt is
//! bounded by its start-to-close timeout; between attempts the step's retry
//! policy decides whether to wait and try again or give up.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::stats::SagaStats;
use crate::{
    ActivityOptions, ActivityRegistry, BookingRequest, NoOpObserver, RetryDecision, SagaContext,
    SagaObserver, StepError, TaskExecutor,
};

/// Executor backed by an [`ActivityRegistry`]
pub struct LocalExecutor {
    registry: ActivityRegistry,
    observer: Arc<dyn SagaObserver>,
    stats: Arc<SagaStats>,
}

impl LocalExecutor {
    /// Executor over `registry` with no observer attached
    pub fn new(registry: ActivityRegistry) -> Self {
        Self {
            registry,
            observer: Arc::new(NoOpObserver),
            stats: Arc::new(SagaStats::new()),
        }
    }

    /// Report attempts to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Count attempts in `stats`
    pub fn with_stats(mut self, stats: Arc<SagaStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Registered activities
    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<SagaStats> {
        &self.stats
    }

    /// Run one attempt under the start-to-close timeout
    async fn attempt(
        &self,
        context: &SagaContext,
        activity: &dyn crate::Activity,
        input: &BookingRequest,
        options: &ActivityOptions,
    ) -> Result<String, StepError> {
        let timeout = options.start_to_close_timeout;
        match tokio::time::timeout(timeout, activity.execute(context, input)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Timeout { after: timeout }),
        }
    }
}

#[async_trait]
impl TaskExecutor for LocalExecutor {
    async fn execute_activity(
        &self,
        context: &SagaContext,
        activity: &str,
        input: &BookingRequest,
        options: &ActivityOptions,
    ) -> Result<String, StepError> {
        let Some(handler) = self.registry.get(activity) else {
            let error = StepError::non_retryable(format!("activity not registered: {}", activity));
            self.observer.on_step_failed(context, activity, &error.to_string());
            return Err(error);
        };

        let mut context = context.clone();
        loop {
            self.observer.on_step_started(&context, activity);
            SagaStats::incr(&self.stats.activity_attempts);
            let started = Instant::now();

            let error = match self.attempt(&context, handler.as_ref(), input, options).await {
                Ok(output) => {
                    let duration_millis = started.elapsed().as_millis() as u64;
                    self.observer
                        .on_step_completed(&context, activity, duration_millis);
                    return Ok(output);
                }
                Err(error) => error,
            };

            let decision = match &options.retry_policy {
                Some(policy) => policy.evaluate(context.attempt, &error),
                None => RetryDecision::Exhausted,
            };

            match decision {
                RetryDecision::RetryAfter(delay) => {
                    SagaStats::incr(&self.stats.activity_retries);
                    self.observer
                        .on_step_retry(&context, activity, &error.to_string(), delay);
                    tokio::time::sleep(delay).await;
                    context = context.retry();
                }
                RetryDecision::Exhausted | RetryDecision::NonRetryable => {
                    SagaStats::incr(&self.stats.activity_failures);
                    self.observer
                        .on_step_failed(&context, activity, &error.to_string());
                    return Err(error);
                }
            }
        }
    }

    fn has_activity(&self, activity: &str) -> bool {
        self.registry.contains(activity)
    }
}
