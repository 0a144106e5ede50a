//! HTTP surface: `GET /?fen=<FEN>&difficulty=<0..1>`.
//!
//! Responds `200` with `{"result":{"from":"e2","to":"e4"}}` (plus a
//! `promotion` key for promotions). Bad input gets a `400`, a position with
//! no legal moves a `422`, and engine or handoff failures a `500`, each with
//! an `{"error": ...}` body.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::moves::BestMove;
use crate::service::MoveService;

#[derive(Debug, Deserialize)]
pub struct MoveQuery {
    pub fen: Option<String>,
    pub difficulty: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub result: BestMove,
}

pub fn router(service: Arc<MoveService>) -> Router {
    Router::new().route("/", get(best_move)).with_state(service)
}

/// Serve until the listener fails. There is no shutdown path.
pub async fn serve(listener: TcpListener, service: Arc<MoveService>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn best_move(
    State(service): State<Arc<MoveService>>,
    Query(query): Query<MoveQuery>,
) -> Result<Json<MoveResponse>, ServiceError> {
    let (fen, difficulty) = validate(query).inspect_err(|e| warn!(error = %e, "rejected request"))?;
    let result = service.best_move(&fen, difficulty).await?;
    Ok(Json(MoveResponse { result }))
}

fn validate(query: MoveQuery) -> Result<(String, f64), ServiceError> {
    let fen = query
        .fen
        .ok_or_else(|| ServiceError::InvalidRequest("missing fen".to_string()))?;
    if fen.trim().is_empty() {
        return Err(ServiceError::InvalidRequest("empty fen".to_string()));
    }
    if fen.contains(['\n', '\r']) {
        return Err(ServiceError::InvalidRequest("fen contains a line break".to_string()));
    }

    let raw = query
        .difficulty
        .ok_or_else(|| ServiceError::InvalidRequest("missing difficulty".to_string()))?;
    let difficulty = parse_difficulty(&raw)?;
    Ok((fen, difficulty))
}

/// Parse a difficulty. Out-of-range values are accepted and resolve to the
/// nearest bucket; non-numbers, NaN and infinities are not.
pub fn parse_difficulty(raw: &str) -> Result<f64, ServiceError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ServiceError::InvalidRequest(format!("difficulty is not a number: {raw:?}")))?;
    if !value.is_finite() {
        return Err(ServiceError::InvalidRequest(format!(
            "difficulty must be finite: {raw:?}"
        )));
    }
    Ok(value)
}
