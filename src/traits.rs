//! Core traits for booking activities and the task executor

use async_trait::async_trait;

use crate::{ActivityOptions, BookingRequest, SagaContext, StepError};

/// A single remote operation (a reservation or its cancellation).
///
/// Activities are invoked by the task executor, possibly more than once for
/// the same transaction, so implementations must be safe to retry. The
/// context's idempotency key identifies the invocation.
///
/// # Example
///
/// ```rust,ignore
/// struct ReserveCar;
///
/// #[async_trait]
/// impl Activity for ReserveCar {
///     fn name(&self) -> &str { "reserve_car" }
///
///     async fn execute(&self, ctx: &SagaContext, input: &BookingRequest)
///         -> Result<String, StepError>
///     {
///         Ok(format!("Booked car: {}", input.car_id))
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Name the activity is registered under
    fn name(&self) -> &str;

    /// Run one attempt
    async fn execute(
        &self,
        context: &SagaContext,
        input: &BookingRequest,
    ) -> Result<String, StepError>;
}

/// Durable-execution collaborator that runs activities for the coordinator.
///
/// One call covers every attempt of an activity: the executor enforces the
/// start-to-close timeout of each attempt and applies the retry policy in
/// `options` between attempts. The error returned is the one from the last
/// attempt.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute `activity` to completion under `options`
    async fn execute_activity(
        &self,
        context: &SagaContext,
        activity: &str,
        input: &BookingRequest,
        options: &ActivityOptions,
    ) -> Result<String, StepError>;

    /// Check whether `activity` can be executed
    fn has_activity(&self, activity: &str) -> bool;
}
