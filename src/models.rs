//! Data models for the datalogger pipeline.
//!
//! `Reading` is the normalized in-memory row; `RawRecord` and
//! `AggregateRecord` are the two response shapes produced by the engine.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// Canonical device identifier.
///
/// Always held as a trimmed string so that `1`, `"1"` and `" 1 "` compare
/// equal without coercing at each comparison site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    // ---
    pub fn new(raw: impl AsRef<str>) -> Self {
        DeviceId(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for DeviceId {
    fn from(raw: &str) -> Self {
        DeviceId::new(raw)
    }
}

impl From<u64> for DeviceId {
    fn from(raw: u64) -> Self {
        DeviceId(raw.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three measured quantities, in their fixed output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    // ---
    #[serde(rename = "precip")]
    Precipitation,
    #[serde(rename = "temp")]
    Temperature,
    #[serde(rename = "hum")]
    Humidity,
}

impl Metric {
    // ---
    /// Output order shared by the raw and aggregate projections.
    pub const ALL: [Metric; 3] = [Metric::Precipitation, Metric::Temperature, Metric::Humidity];

    /// Position in [`Metric::ALL`].
    pub fn index(self) -> usize {
        match self {
            Metric::Precipitation => 0,
            Metric::Temperature => 1,
            Metric::Humidity => 2,
        }
    }
}

/// One normalized sensor sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    // ---
    /// Storage key only; never consulted by queries.
    pub id: Uuid,
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub precipitation: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl Reading {
    // ---
    /// Build a reading, folding NaN and infinite metric values into "absent".
    pub fn new(
        id: Uuid,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        precipitation: Option<f64>,
        temperature: Option<f64>,
        humidity: Option<f64>,
    ) -> Self {
        // ---
        Reading {
            id,
            device_id,
            timestamp,
            precipitation: present(precipitation),
            temperature: present(temperature),
            humidity: present(humidity),
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Precipitation => self.precipitation,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        }
    }
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Unaggregated output row: one per metric per reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    // ---
    pub label: Metric,
    pub measured_at: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Aggregated output row: one per metric per non-empty bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    // ---
    pub label: Metric,
    /// Start of the bucket.
    pub time_slot: DateTime<Utc>,
    pub value: f64,
}

/// One measurement object as published by the remote feed.
///
/// Missing and `null` fields both deserialize to `None`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct RawMeasurement {
    // ---
    #[serde(default)]
    pub precip: Option<f64>,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub hum: Option<f64>,
}

impl RawMeasurement {
    // ---
    pub fn to_reading(&self, device_id: DeviceId, timestamp: DateTime<Utc>) -> Reading {
        Reading::new(
            Uuid::new_v4(),
            device_id,
            timestamp,
            self.precip,
            self.temp,
            self.hum,
        )
    }
}

/// Parse an ISO 8601 instant.
///
/// Accepts RFC 3339 with an offset, a naive date-time (`T` or space
/// separated, optional fraction) taken as UTC, or a bare date at midnight UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse an ingestion key: an ISO 8601 instant or integer epoch milliseconds.
pub fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(millis) = raw.trim().parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    parse_instant(raw)
}
