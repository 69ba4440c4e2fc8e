//! HTTP gateway
//!
//! `POST /book` submits one booking transaction and answers with its
//! outcome. `GET /health` and `GET /stats` report on the service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::stats::SagaStats;
use crate::{BookingRequest, BookingSummary, SagaClient, SagaError, TransactionResult};

/// Error reported when a success result cannot be split into its three legs
pub const INCOMPLETE_BOOKING: &str =
    "Incomplete booking results. Please check the booking details.";

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct GatewayState {
    /// Submits transactions
    pub client: SagaClient,
    /// Queue the booking worker polls
    pub task_queue: Arc<str>,
    /// Counters served on `/stats`
    pub stats: Arc<SagaStats>,
}

impl GatewayState {
    /// State submitting to `task_queue`
    pub fn new(client: SagaClient, task_queue: &str, stats: Arc<SagaStats>) -> Self {
        Self {
            client,
            task_queue: task_queue.into(),
            stats,
        }
    }
}

/// Routes `POST /book`, `GET /health` and `GET /stats`
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/book", post(handle_book))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .with_state(state)
}

/// Serve the gateway on `addr` until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: GatewayState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Gateway listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Flight attempts as sent by clients: a number or a numeric string
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Attempts {
    /// JSON number
    Number(i64),
    /// Numeric string
    Text(String),
}

impl Attempts {
    fn parse(&self) -> Result<u32, String> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("attempts must be an integer, got {:?}", s))?,
        };
        if n < 1 {
            return Err(format!("attempts must be at least 1, got {}", n));
        }
        u32::try_from(n).map_err(|_| format!("attempts out of range: {}", n))
    }
}

/// Body of `POST /book`
#[derive(Clone, Debug, Deserialize)]
pub struct BookVacationBody {
    /// Traveler name; a random suffix makes it a unique user id
    pub name: String,
    /// Flight attempt budget
    pub attempts: Attempts,
    /// Car to reserve
    #[serde(default)]
    pub car: String,
    /// Hotel to reserve
    #[serde(default)]
    pub hotel: String,
    /// Flight to reserve
    #[serde(default)]
    pub flight: String,
}

/// Body returned by `POST /book`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookVacationResponse {
    /// Transaction id generated for the caller
    pub user_id: String,
    /// Confirmation text, or `Voyage cancelled`
    pub result: String,
    /// Whether the transaction rolled back
    pub cancelled: bool,
    /// Car confirmation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car: Option<String>,
    /// Hotel confirmation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotel: Option<String>,
    /// Flight confirmation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,
    /// Failure detail, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BookVacationResponse {
    /// Map a terminal result to the response body
    pub fn from_result(user_id: String, result: &TransactionResult) -> Self {
        let mut response = Self {
            user_id,
            result: result.message().to_string(),
            ..Default::default()
        };

        match result {
            TransactionResult::Success { confirmation } => match BookingSummary::parse(confirmation) {
                Some(summary) => {
                    response.car = Some(summary.car.into());
                    response.hotel = Some(summary.hotel.into());
                    response.flight = Some(summary.flight.into());
                }
                None => response.error = Some(INCOMPLETE_BOOKING.to_string()),
            },
            TransactionResult::Cancelled => response.cancelled = true,
            TransactionResult::Failed { error, .. } => {
                response.cancelled = true;
                response.error = Some(error.to_string());
            }
        }
        response
    }
}

/// `<name with spaces as dashes, lower-cased>-<6 random digits>`
pub fn generate_unique_username(name: &str) -> String {
    let digits: String = uuid::Uuid::new_v4()
        .as_u128()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("{}-{}", name.replace(' ', "-").to_lowercase(), digits)
}

async fn handle_book(
    State(state): State<GatewayState>,
    Json(body): Json<BookVacationBody>,
) -> Response {
    let attempts = match body.attempts.parse() {
        Ok(n) => n,
        Err(error) => {
            tracing::debug!(%error, "Rejecting booking request");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": error })),
            )
                .into_response();
        }
    };

    let user_id = generate_unique_username(&body.name);
    let request = match BookingRequest::new(
        user_id.as_str(),
        body.car,
        body.hotel,
        body.flight,
        attempts,
    ) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "user_id": user_id, "error": e.to_string() })),
            )
                .into_response();
        }
    };

    tracing::info!(user_id = %user_id, attempts, "Booking vacation");

    match state
        .client
        .execute_transaction(&state.task_queue, request)
        .await
    {
        Ok(result) => Json(BookVacationResponse::from_result(user_id, &result)).into_response(),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Booking transaction not executed");
            let status = match e {
                SagaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            (
                status,
                Json(serde_json::json!({ "user_id": user_id, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn handle_stats(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}
