// src/routes/measurements.rs
//! Measurement query endpoints: `/api/data` (raw) and `/api/summary` (bucketed).
//!
//! Handlers validate the query string into an [`engine::Query`] and run it
//! against the store's current snapshot.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::engine::{self, QueryOutput, Reducer, Span};
use crate::error::AppError;
use crate::models::{parse_instant, DeviceId};
use crate::RecordStore;

// ---

pub fn router() -> Router<Arc<RecordStore>> {
    // ---
    Router::new()
        .route("/api/data", get(data_handler))
        .route("/api/summary", get(summary_handler))
}

/// Query string shared by `/api/data` and `/api/summary`.
///
/// Timestamps are ISO 8601; a blank value counts as absent.
#[derive(Debug, Default, Deserialize)]
pub struct MeasurementQuery {
    datalogger: Option<String>,
    since: Option<String>,
    before: Option<String>,
    span: Option<String>,
    reducer: Option<String>,
}

async fn data_handler(
    Query(params): Query<MeasurementQuery>,
    State(store): State<Arc<RecordStore>>,
) -> Result<Json<QueryOutput>, AppError> {
    // ---
    info!("GET /api/data - {:?}", params);

    let query = params.resolve(Utc::now(), false)?;
    run(&store, &query)
}

async fn summary_handler(
    Query(params): Query<MeasurementQuery>,
    State(store): State<Arc<RecordStore>>,
) -> Result<Json<QueryOutput>, AppError> {
    // ---
    info!("GET /api/summary - {:?}", params);

    let query = params.resolve(Utc::now(), true)?;
    run(&store, &query)
}

fn run(store: &RecordStore, query: &engine::Query) -> Result<Json<QueryOutput>, AppError> {
    // ---
    let snapshot = store.snapshot();
    let output = engine::query(&snapshot, query);
    debug!(
        "Returning {} records for datalogger {} ({} readings in snapshot)",
        output.len(),
        query.device_id,
        snapshot.len()
    );
    Ok(Json(output))
}

impl MeasurementQuery {
    // ---
    /// Validate the parameters into an engine query.
    ///
    /// `before` defaults to `now`; `since` defaults to no lower bound.
    /// `span`/`reducer` are only honoured when `aggregate` is set.
    fn resolve(&self, now: DateTime<Utc>, aggregate: bool) -> Result<engine::Query, AppError> {
        // ---
        let device_id = non_blank(&self.datalogger)
            .map(DeviceId::new)
            .ok_or_else(|| AppError::BadRequest("missing required parameter 'datalogger'".into()))?;

        let since = non_blank(&self.since)
            .map(|raw| parse_param("since", raw))
            .transpose()?;
        let before = non_blank(&self.before)
            .map(|raw| parse_param("before", raw))
            .transpose()?;

        if let (Some(since), Some(before)) = (since, before) {
            if since > before {
                return Err(AppError::BadRequest(format!(
                    "'since' ({}) is after 'before' ({})",
                    since.to_rfc3339(),
                    before.to_rfc3339()
                )));
            }
        }

        let aggregation = if aggregate {
            let span = non_blank(&self.span)
                .map(str::parse::<Span>)
                .transpose()?
                .unwrap_or_default();
            let reducer = non_blank(&self.reducer)
                .map(str::parse::<Reducer>)
                .transpose()?;
            span.resolve(reducer)?
        } else {
            None
        };

        Ok(engine::Query {
            device_id,
            since,
            before: before.unwrap_or(now),
            aggregation,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_param(name: &str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    parse_instant(raw).ok_or_else(|| {
        AppError::BadRequest(format!("'{}' is not an ISO 8601 timestamp: '{}'", name, raw))
    })
}
