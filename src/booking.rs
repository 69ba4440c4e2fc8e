//! Vacation booking data model
//!
//! A booking transaction reserves a car, a hotel and a flight, in that order.
//! Each reservation has a matching cancellation that undoes it.

use serde::{Deserialize, Serialize};

use crate::{SagaError, TransactionId};

/// Saga type identifier
pub const SAGA_TYPE: &str = "book_vacation";

/// Result text reported for a rolled-back transaction
pub const CANCELLED_MARKER: &str = "Voyage cancelled";

/// Activity and step names of the book_vacation saga
pub mod steps {
    /// Car step
    pub const CAR: &str = "car";
    /// Hotel step
    pub const HOTEL: &str = "hotel";
    /// Flight step
    pub const FLIGHT: &str = "flight";

    /// Reserve a car
    pub const RESERVE_CAR: &str = "reserve_car";
    /// Reserve a hotel room
    pub const RESERVE_HOTEL: &str = "reserve_hotel";
    /// Reserve a flight seat
    pub const RESERVE_FLIGHT: &str = "reserve_flight";
    /// Undo `reserve_car`
    pub const CANCEL_CAR: &str = "cancel_car";
    /// Undo `reserve_hotel`
    pub const CANCEL_HOTEL: &str = "cancel_hotel";
    /// Undo `reserve_flight`
    pub const CANCEL_FLIGHT: &str = "cancel_flight";

    /// Every activity a worker must register
    pub const ALL_ACTIVITIES: [&str; 6] = [
        RESERVE_CAR,
        RESERVE_HOTEL,
        RESERVE_FLIGHT,
        CANCEL_CAR,
        CANCEL_HOTEL,
        CANCEL_FLIGHT,
    ];
}

/// How a step's attempt budget is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptBudget {
    /// Retry until success or a non-retryable failure
    Unbounded,
    /// Bounded by `BookingRequest::max_flight_attempts`, constant interval
    CallerBounded,
}

/// One forward step paired with its compensation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingStep {
    /// Step name used in logs and the journal
    pub name: &'static str,
    /// Forward activity
    pub action: &'static str,
    /// Activity that undoes `action`
    pub compensation: &'static str,
    /// How the forward activity is retried
    pub budget: AttemptBudget,
}

/// The fixed forward order: car, hotel, flight
pub const BOOKING_STEPS: [BookingStep; 3] = [
    BookingStep {
        name: steps::CAR,
        action: steps::RESERVE_CAR,
        compensation: steps::CANCEL_CAR,
        budget: AttemptBudget::Unbounded,
    },
    BookingStep {
        name: steps::HOTEL,
        action: steps::RESERVE_HOTEL,
        compensation: steps::CANCEL_HOTEL,
        budget: AttemptBudget::Unbounded,
    },
    BookingStep {
        name: steps::FLIGHT,
        action: steps::RESERVE_FLIGHT,
        compensation: steps::CANCEL_FLIGHT,
        budget: AttemptBudget::CallerBounded,
    },
];

/// Input of one booking transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Unique per transaction, doubles as the transaction id
    pub traveler_id: Box<str>,
    /// Car to reserve
    pub car_id: Box<str>,
    /// Hotel to reserve
    pub hotel_id: Box<str>,
    /// Flight to reserve
    pub flight_id: Box<str>,
    /// Attempt budget of the flight step (at least 1)
    pub max_flight_attempts: u32,
}

impl BookingRequest {
    /// Build a request, rejecting an empty traveler id or a zero flight budget
    pub fn new(
        traveler_id: impl Into<Box<str>>,
        car_id: impl Into<Box<str>>,
        hotel_id: impl Into<Box<str>>,
        flight_id: impl Into<Box<str>>,
        max_flight_attempts: u32,
    ) -> Result<Self, SagaError> {
        let request = Self {
            traveler_id: traveler_id.into(),
            car_id: car_id.into(),
            hotel_id: hotel_id.into(),
            flight_id: flight_id.into(),
            max_flight_attempts,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the invariants the coordinator relies on
    pub fn validate(&self) -> Result<(), SagaError> {
        if self.traveler_id.trim().is_empty() {
            return Err(SagaError::InvalidRequest("traveler id is empty".into()));
        }
        if self.max_flight_attempts < 1 {
            return Err(SagaError::InvalidRequest(
                "flight attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Transaction id derived from the traveler id
    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::new(self.traveler_id.clone())
    }
}

/// Whether a rollback that hit a compensation failure is reported distinctly
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReporting {
    /// Every rollback ends in `TransactionResult::Cancelled`
    #[default]
    Lenient,
    /// Rollbacks end in `TransactionResult::Failed` with the triggering error
    Strict,
}

/// Outcome of the rollback in strict reporting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Every compensation succeeded
    RolledBack,
    /// At least one compensation failed; the first failure is kept
    RollbackFailed {
        /// First compensation failure
        compensation_error: Box<str>,
    },
}

/// Terminal value of a booking transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionResult {
    /// All three steps confirmed, in forward order
    Success {
        /// Reserve confirmations joined with one space
        confirmation: Box<str>,
    },
    /// Forward sequence aborted and applied effects undone
    Cancelled,
    /// Strict variant of `Cancelled`
    Failed {
        /// How the rollback went
        rollback: RollbackStatus,
        /// Error of the step that failed
        error: Box<str>,
    },
}

impl TransactionResult {
    /// Text shown to the caller as the transaction result
    pub fn message(&self) -> &str {
        match self {
            Self::Success { confirmation } => confirmation,
            Self::Cancelled | Self::Failed { .. } => CANCELLED_MARKER,
        }
    }

    /// Whether every step committed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the transaction was rolled back
    pub fn is_cancelled(&self) -> bool {
        !self.is_success()
    }
}

/// Per-leg confirmation identifiers parsed from a success result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSummary {
    /// Car confirmation id
    pub car: Box<str>,
    /// Hotel confirmation id
    pub hotel: Box<str>,
    /// Flight confirmation id
    pub flight: Box<str>,
}

impl BookingSummary {
    const CAR_MARKER: &'static str = "Booked car: ";
    const HOTEL_MARKER: &'static str = "Booked hotel: ";
    const FLIGHT_MARKER: &'static str = "Booked flight: ";

    /// Parse `Booked car: … Booked hotel: … Booked flight: …`
    pub fn parse(result: &str) -> Option<Self> {
        let (_, rest) = result.split_once(Self::CAR_MARKER)?;
        let (car, rest) = rest.split_once(Self::HOTEL_MARKER)?;
        let (hotel, flight) = rest.split_once(Self::FLIGHT_MARKER)?;
        Some(Self {
            car: car.trim().into(),
            hotel: hotel.trim().into(),
            flight: flight.trim().into(),
        })
    }
}
