// src/routes/health.rs
//! API health check endpoint for the datalogger backend.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the service is running. It is a sibling
//! module in the `routes` directory and follows the Explicit Module Boundary
//! Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the `/health` route

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::RecordStore;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Rows in the snapshot currently being served.
    readings: usize,
}

/// Handle `GET /health`.
///
/// Reports the size of the in-memory snapshot; never touches the disk.
async fn health(State(store): State<Arc<RecordStore>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        readings: store.snapshot().len(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<Arc<RecordStore>> {
    Router::new().route("/health", get(health))
}
