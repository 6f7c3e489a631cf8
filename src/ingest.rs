//! Ingestion adapter: pulls the measurements feed and folds it into the store.
//!
//! The feed is a JSON array of objects mapping a timestamp (ISO 8601 or epoch
//! milliseconds) to `{"precip", "temp", "hum"}`. Every accepted entry becomes a
//! [`Reading`] for the configured datalogger with a fresh storage id.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::IngestError;
use crate::models::{parse_feed_timestamp, DeviceId, RawMeasurement, Reading};
use crate::store::RecordStore;
use crate::Config;

// ---

/// HTTP client for the feed, with the configured request timeout.
pub fn http_client(cfg: &Config) -> Result<Client, IngestError> {
    // ---
    Client::builder()
        .timeout(Duration::from_secs(cfg.ingest_timeout_secs))
        .build()
        .map_err(|source| IngestError::Http {
            url: cfg.measurements_url.clone(),
            source,
        })
}

/// Fetch the feed and merge it into `store`. Returns the merged row count.
///
/// On error the store and its current snapshot are left untouched.
pub async fn ingest(client: &Client, cfg: &Config, store: &RecordStore) -> Result<usize, IngestError> {
    // ---
    let readings = fetch_measurements(client, &cfg.measurements_url, &cfg.datalogger_id).await?;
    let count = store.merge(readings)?;
    Ok(count)
}

/// GET the feed at `url` and normalize it into readings for `device_id`.
pub async fn fetch_measurements(
    client: &Client,
    url: &str,
    device_id: &DeviceId,
) -> Result<Vec<Reading>, IngestError> {
    // ---
    tracing::debug!("Fetching measurements from: {}", url);

    let http_err = |source: reqwest::Error| IngestError::Http {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body: Value = response.json().await.map_err(http_err)?;
    let readings = parse_measurements(&body, device_id)?;

    tracing::info!("Fetched {} readings from {}", readings.len(), url);
    Ok(readings)
}

/// Normalize a decoded feed body.
///
/// Entries with an unparseable timestamp or a non-numeric payload are skipped.
/// Missing metric fields become absent values.
pub fn parse_measurements(body: &Value, device_id: &DeviceId) -> Result<Vec<Reading>, IngestError> {
    // ---
    let entries = body
        .as_array()
        .ok_or_else(|| IngestError::Shape(format!("expected a JSON array, got {}", kind(body))))?;

    let mut readings = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;

    for (i, entry) in entries.iter().enumerate() {
        let Some(map) = entry.as_object() else {
            tracing::debug!("Skipping item {}: not an object - Raw item: {}", i, entry);
            skipped += 1;
            continue;
        };

        for (key, values) in map {
            let Some(timestamp) = parse_feed_timestamp(key) else {
                tracing::debug!("Skipping item {}: bad timestamp '{}'", i, key);
                skipped += 1;
                continue;
            };

            match serde_json::from_value::<RawMeasurement>(values.clone()) {
                Ok(measurement) => {
                    readings.push(measurement.to_reading(device_id.clone(), timestamp));
                }
                Err(e) => {
                    tracing::debug!(
                        "Failed to parse item {} at {}: {} - Raw item: {}",
                        i,
                        key,
                        e,
                        values
                    );
                    skipped += 1;
                }
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed feed entries", skipped);
    }
    Ok(readings)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
