//! HTTP routes.
//!
//! - `GET /id`: one ID.
//! - `POST /ids`: `{"amount": n}` IDs; `amount` defaults to 1.
//! - `GET /health`: liveness.
//!
//! Handlers never block a runtime thread: failed attempts are retried after
//! an async sleep, and bulk requests are built on the blocking pool.

use crate::server::error::ApiError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snowdrift::{IdGenerator, validate_amount};
use std::{sync::Arc, time::Duration};
use tokio::{task, time::sleep};
use tower_http::trace::TraceLayer;

/// Pause between attempts while the generator keeps failing.
const RETRY_DELAY: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct AppState {
    generator: Arc<IdGenerator>,
    max_allowed_ids: usize,
}

impl AppState {
    pub fn new(generator: IdGenerator, max_allowed_ids: usize) -> Self {
        Self {
            generator: Arc::new(generator),
            max_allowed_ids,
        }
    }

    /// Takes one ID, retrying until the generator recovers.
    async fn next_id(&self) -> u64 {
        let mut warned = false;
        loop {
            match self.generator.try_next_id() {
                Ok(id) => return id,
                Err(e) => {
                    if !warned {
                        tracing::warn!("ID generation failed, retrying: {e}");
                        warned = true;
                    }
                    sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    /// Builds `amount` IDs on the blocking pool, retrying failed attempts.
    async fn next_ids(&self, amount: usize) -> Result<Vec<u64>, ApiError> {
        let mut ids = Vec::with_capacity(amount);
        let mut warned = false;
        while ids.len() < amount {
            let generator = Arc::clone(&self.generator);
            let remaining = amount - ids.len();
            match task::spawn_blocking(move || generator.try_next_ids(remaining)).await? {
                Ok(batch) => ids.extend(batch),
                Err(e) => {
                    if !warned {
                        tracing::warn!(remaining, "ID generation failed, retrying: {e}");
                        warned = true;
                    }
                    sleep(RETRY_DELAY).await;
                }
            }
        }
        Ok(ids)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdResponse {
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdsResponse {
    pub ids: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/id", get(next_id))
        .route("/ids", post(next_ids))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn next_id(State(state): State<AppState>) -> Json<IdResponse> {
    Json(IdResponse {
        id: state.next_id().await,
    })
}

async fn next_ids(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IdsResponse>, ApiError> {
    let amount = parse_amount(&body)?;
    if amount > state.max_allowed_ids {
        return Err(ApiError::TooManyIds {
            amount,
            max: state.max_allowed_ids,
        });
    }

    let ids = state.next_ids(amount).await?;
    Ok(Json(IdsResponse { ids }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
    })
}

/// Reads `amount` from a JSON object body.
///
/// An empty body or a missing key means 1. Only JSON integers are accepted;
/// strings, floats, booleans and `null` are rejected, as are values that are
/// not positive.
fn parse_amount(body: &[u8]) -> Result<usize, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(1);
    }

    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(fields) = value else {
        return Err(ApiError::InvalidAmount);
    };

    match fields.get("amount") {
        None => Ok(1),
        Some(amount) => amount
            .as_i64()
            .ok_or(ApiError::InvalidAmount)
            .and_then(|amount| validate_amount(amount).map_err(|_| ApiError::InvalidAmount)),
    }
}
