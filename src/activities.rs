//! Simulated booking services
//!
//! Stand-ins for the car, hotel and flight providers. Reservations echo the
//! requested id; the flight provider can be told to fail transiently for
//! the first attempts of every transaction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::booking::steps;
use crate::{Activity, ActivityRegistry, BookingRequest, SagaContext, StepError};

/// Kind of reservation a simulated activity handles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Rental car
    Car,
    /// Hotel room
    Hotel,
    /// Flight seat
    Flight,
}

impl Resource {
    fn id<'a>(&self, request: &'a BookingRequest) -> &'a str {
        match self {
            Self::Car => &request.car_id,
            Self::Hotel => &request.hotel_id,
            Self::Flight => &request.flight_id,
        }
    }

    fn reserve_activity(&self) -> &'static str {
        match self {
            Self::Car => steps::RESERVE_CAR,
            Self::Hotel => steps::RESERVE_HOTEL,
            Self::Flight => steps::RESERVE_FLIGHT,
        }
    }

    fn cancel_activity(&self) -> &'static str {
        match self {
            Self::Car => steps::CANCEL_CAR,
            Self::Hotel => steps::CANCEL_HOTEL,
            Self::Flight => steps::CANCEL_FLIGHT,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Car => write!(f, "car"),
            Self::Hotel => write!(f, "hotel"),
            Self::Flight => write!(f, "flight"),
        }
    }
}

/// Behaviour of the simulated providers
#[derive(Clone, Debug, Default)]
pub struct SimulatedServices {
    /// Attempts per transaction the flight provider fails before it answers
    pub transient_flight_failures: u32,
    /// Delay added to every call
    pub latency: Duration,
}

impl SimulatedServices {
    /// Providers that always answer at once
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` flight attempts of every transaction
    pub fn with_transient_flight_failures(mut self, n: u32) -> Self {
        self.transient_flight_failures = n;
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn call(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Reserves one resource, echoing its id in the confirmation
pub struct ReserveActivity {
    resource: Resource,
    services: Arc<SimulatedServices>,
}

impl ReserveActivity {
    /// Reserve `resource` against `services`
    pub fn new(resource: Resource, services: Arc<SimulatedServices>) -> Self {
        Self { resource, services }
    }
}

#[async_trait]
impl Activity for ReserveActivity {
    fn name(&self) -> &str {
        self.resource.reserve_activity()
    }

    async fn execute(
        &self,
        context: &SagaContext,
        input: &BookingRequest,
    ) -> Result<String, StepError> {
        self.services.call().await;
        tracing::debug!(
            idempotency_key = %context.idempotency_key(),
            "Reserving {}",
            self.resource
        );

        let id = self.resource.id(input);
        if id.trim().is_empty() {
            return Err(StepError::non_retryable(format!(
                "invalid {} id: must not be empty",
                self.resource
            )));
        }

        if self.resource == Resource::Flight
            && context.attempt <= self.services.transient_flight_failures
        {
            tracing::debug!(
                transaction_id = %context.transaction_id,
                attempt = context.attempt,
                "Flight service unavailable"
            );
            return Err(StepError::retryable(format!(
                "flight service unavailable (attempt {})",
                context.attempt
            )));
        }

        Ok(format!("Booked {}: {}", self.resource, id))
    }
}

/// Cancels one resource; never fails
pub struct CancelActivity {
    resource: Resource,
    services: Arc<SimulatedServices>,
}

impl CancelActivity {
    /// Cancel `resource` against `services`
    pub fn new(resource: Resource, services: Arc<SimulatedServices>) -> Self {
        Self { resource, services }
    }
}

#[async_trait]
impl Activity for CancelActivity {
    fn name(&self) -> &str {
        self.resource.cancel_activity()
    }

    async fn execute(
        &self,
        context: &SagaContext,
        input: &BookingRequest,
    ) -> Result<String, StepError> {
        self.services.call().await;
        tracing::debug!(
            idempotency_key = %context.idempotency_key(),
            "Cancelling {}",
            self.resource
        );
        Ok(format!("Cancelled {}: {}", self.resource, self.resource.id(input)))
    }
}

/// Register the six booking activities against `services`
pub fn register_booking_activities(
    registry: &mut ActivityRegistry,
    services: SimulatedServices,
) -> &mut ActivityRegistry {
    let services = Arc::new(services);
    for resource in [Resource::Car, Resource::Hotel, Resource::Flight] {
        registry
            .register(Arc::new(ReserveActivity::new(resource, services.clone())))
            .register(Arc::new(CancelActivity::new(resource, services.clone())));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionId;

    fn context(attempt: u32) -> SagaContext {
        let mut ctx = SagaContext::new(TransactionId::new("jane-123456"), "book_vacation")
            .for_step("flight", 2);
        ctx.attempt = attempt;
        ctx
    }

    fn request() -> BookingRequest {
        BookingRequest::new("jane-123456", "C1", "H1", "F1", 3).unwrap()
    }

    #[test]
    fn test_registers_all_activities() {
        let mut registry = ActivityRegistry::new();
        register_booking_activities(&mut registry, SimulatedServices::new());
        assert_eq!(registry.len(), 6);
        assert!(steps::ALL_ACTIVITIES.iter().all(|a| registry.contains(a)));
    }

    #[tokio::test]
    async fn test_reserve_and_cancel() {
        let services = Arc::new(SimulatedServices::new());
        let reserve = ReserveActivity::new(Resource::Hotel, services.clone());
        let cancel = CancelActivity::new(Resource::Hotel, services);

        assert_eq!(
            reserve.execute(&context(1), &request()).await.unwrap(),
            "Booked hotel: H1"
        );
        assert_eq!(
            cancel.execute(&context(1), &request()).await.unwrap(),
            "Cancelled hotel: H1"
        );
    }

    #[tokio::test]
    async fn test_blank_id_is_not_retryable() {
        let reserve = ReserveActivity::new(Resource::Car, Arc::new(SimulatedServices::new()));
        let mut request = request();
        request.car_id = "  ".into();

        let err = reserve.execute(&context(1), &request).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_flight_recovers_after_transient_failures() {
        let services = Arc::new(SimulatedServices::new().with_transient_flight_failures(2));
        let reserve = ReserveActivity::new(Resource::Flight, services);

        assert!(reserve.execute(&context(1), &request()).await.unwrap_err().is_retryable());
        assert!(reserve.execute(&context(2), &request()).await.is_err());
        assert_eq!(
            reserve.execute(&context(3), &request()).await.unwrap(),
            "Booked flight: F1"
        );
    }
}
