//! # Server — HTTP front-end for the commit log
//!
//! A thin JSON-over-HTTP translation of the log's two capabilities:
//!
//! | Route    | Body                                  | Response                           |
//! |----------|---------------------------------------|------------------------------------|
//! | `POST /` | `{"record": {"value": "<base64>"}}`   | `{"offset": n}`                    |
//! | `GET /`  | `{"offset": n}`                       | `{"record": {"value", "offset"}}`  |
//!
//! Record values travel base64-encoded, since JSON cannot carry raw bytes.
//! Any malformed request body (bad JSON or bad base64) maps to
//! `400 Bad Request`; an out-of-range offset to `404 Not Found`; storage
//! failures to `500 Internal Server Error`.
//!
//! Handlers depend only on the [`CommitLog`] trait, so tests (and alternate
//! storage backends) can substitute their own implementation.

use axum::{
    extract::rejection::JsonRejection, extract::State, http::StatusCode, routing::post, Json,
    Router,
};
use log::{CommitLog, LogError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handler state: the log behind its capability trait.
#[derive(Clone)]
pub struct AppState {
    log: Arc<dyn CommitLog>,
}

/// Builds the router serving the produce/consume endpoints.
pub fn router(log: Arc<dyn CommitLog>) -> Router {
    Router::new()
        .route("/", post(produce).get(consume))
        .with_state(AppState { log })
}

/// A record as it travels over the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordBody {
    /// The record payload, base64-encoded.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,

    /// The offset the engine stamped on the record. Ignored on produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ProduceRequest {
    pub record: RecordBody,
}

#[derive(Debug, Serialize)]
pub struct ProduceResponse {
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub record: RecordBody,
}

async fn produce(
    State(state): State<AppState>,
    payload: Result<Json<ProduceRequest>, JsonRejection>,
) -> Result<Json<ProduceResponse>, StatusCode> {
    // Every rejection flavour (syntax, data, missing content type) is the
    // caller's fault.
    let Json(req) = payload.map_err(|_| StatusCode::BAD_REQUEST)?;
    let log = state.log.clone();

    // The log does blocking disk I/O; keep it off the async workers.
    let offset = tokio::task::spawn_blocking(move || log.append(req.record.value))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "produce task panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "append failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ProduceResponse { offset }))
}

async fn consume(
    State(state): State<AppState>,
    payload: Result<Json<ConsumeRequest>, JsonRejection>,
) -> Result<Json<ConsumeResponse>, StatusCode> {
    let Json(req) = payload.map_err(|_| StatusCode::BAD_REQUEST)?;
    let log = state.log.clone();

    let result = tokio::task::spawn_blocking(move || log.read(req.offset))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "consume task panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match result {
        Ok(record) => Ok(Json(ConsumeResponse {
            record: RecordBody {
                value: record.value,
                offset: Some(record.offset),
            },
        })),
        Err(LogError::OffsetOutOfRange) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(error = %e, offset = req.offset, "read failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}
