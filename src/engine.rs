//! Query engine: device/time filtering plus raw or bucketed projections.
//!
//! Every function here is pure over a borrowed [`Snapshot`]; nothing is
//! cached or mutated between calls.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::QueryError;
use crate::models::{AggregateRecord, DeviceId, Metric, RawRecord, Reading};
use crate::store::Snapshot;

// ---

/// Width of an aggregation bucket, anchored at the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    Hour,
    Day,
}

impl BucketWidth {
    // ---
    pub fn seconds(self) -> i64 {
        match self {
            BucketWidth::Hour => 3_600,
            BucketWidth::Day => 86_400,
        }
    }

    /// Start of the left-closed bucket containing `ts`.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // ---
        let offset = ts.timestamp().rem_euclid(self.seconds());
        ts - Duration::seconds(offset) - Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
    }
}

/// How the values of one metric inside one bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Max,
}

impl FromStr for Reducer {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reducer::Mean),
            "max" => Ok(Reducer::Max),
            _ => Err(QueryError::UnknownReducer(s.to_string())),
        }
    }
}

/// Bucket width and reducer, chosen independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregation {
    pub width: BucketWidth,
    pub reducer: Reducer,
}

/// The `span` request parameter.
///
/// `max` is kept for compatibility with existing clients and means
/// day-wide buckets reduced with max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Span {
    #[default]
    Raw,
    Hour,
    Day,
    Max,
}

impl FromStr for Span {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Span::Raw),
            "hour" => Ok(Span::Hour),
            "day" => Ok(Span::Day),
            "max" => Ok(Span::Max),
            _ => Err(QueryError::UnknownSpan(s.to_string())),
        }
    }
}

impl Span {
    // ---
    /// Combine the span with an optional explicit reducer.
    ///
    /// Returns `None` for raw output.
    pub fn resolve(self, reducer: Option<Reducer>) -> Result<Option<Aggregation>, QueryError> {
        // ---
        let aggregation = match (self, reducer) {
            (Span::Raw, None) => return Ok(None),
            (Span::Raw, Some(_)) => return Err(QueryError::ReducerWithoutSpan),
            (Span::Hour, r) => Aggregation {
                width: BucketWidth::Hour,
                reducer: r.unwrap_or(Reducer::Mean),
            },
            (Span::Day, r) => Aggregation {
                width: BucketWidth::Day,
                reducer: r.unwrap_or(Reducer::Mean),
            },
            (Span::Max, Some(Reducer::Mean)) => {
                return Err(QueryError::ConflictingReducer("mean".to_string()))
            }
            (Span::Max, _) => Aggregation {
                width: BucketWidth::Day,
                reducer: Reducer::Max,
            },
        };
        Ok(Some(aggregation))
    }
}

/// A fully resolved request against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    // ---
    pub device_id: DeviceId,
    /// `None` means no lower bound.
    pub since: Option<DateTime<Utc>>,
    pub before: DateTime<Utc>,
    /// `None` means raw output.
    pub aggregation: Option<Aggregation>,
}

/// Engine output; each variant serializes as a plain JSON list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Raw(Vec<RawRecord>),
    Aggregate(Vec<AggregateRecord>),
}

impl QueryOutput {
    // ---
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Raw(records) => records.len(),
            QueryOutput::Aggregate(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Readings of `device_id` with `since <= timestamp <= before`.
///
/// Order follows the input; an inverted range yields nothing.
pub fn filter<'a>(
    readings: &'a [Reading],
    device_id: &DeviceId,
    since: Option<DateTime<Utc>>,
    before: DateTime<Utc>,
) -> Vec<&'a Reading> {
    // ---
    readings
        .iter()
        .filter(|r| &r.device_id == device_id)
        .filter(|r| since.map_or(true, |s| r.timestamp >= s))
        .filter(|r| r.timestamp <= before)
        .collect()
}

/// Three records per reading: precip, temp, hum.
pub fn to_raw(readings: &[&Reading]) -> Vec<RawRecord> {
    // ---
    readings
        .iter()
        .flat_map(|r| {
            Metric::ALL.into_iter().map(move |metric| RawRecord {
                label: metric,
                measured_at: r.timestamp,
                value: r.value(metric),
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
    max: Option<f64>,
}

impl Accumulator {
    // ---
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn finish(&self, reducer: Reducer) -> Option<f64> {
        match reducer {
            Reducer::Mean => (self.count > 0).then(|| self.sum / self.count as f64),
            Reducer::Max => self.max,
        }
    }
}

/// Reduce readings into buckets, ascending by slot.
///
/// A bucket/metric pair with no values is left out rather than emitted as null.
pub fn to_aggregate(readings: &[&Reading], aggregation: Aggregation) -> Vec<AggregateRecord> {
    // ---
    let mut buckets: BTreeMap<DateTime<Utc>, [Accumulator; 3]> = BTreeMap::new();

    for reading in readings {
        let slot = aggregation.width.bucket_start(reading.timestamp);
        let accs = buckets.entry(slot).or_default();
        for metric in Metric::ALL {
            if let Some(value) = reading.value(metric) {
                accs[metric.index()].push(value);
            }
        }
    }

    buckets
        .into_iter()
        .flat_map(|(slot, accs)| {
            Metric::ALL.into_iter().filter_map(move |metric| {
                accs[metric.index()]
                    .finish(aggregation.reducer)
                    .map(|value| AggregateRecord {
                        label: metric,
                        time_slot: slot,
                        value,
                    })
            })
        })
        .collect()
}

/// Filter the snapshot and project it according to `query.aggregation`.
pub fn query(snapshot: &Snapshot, query: &Query) -> QueryOutput {
    // ---
    let filtered = filter(snapshot.readings(), &query.device_id, query.since, query.before);

    match query.aggregation {
        None => QueryOutput::Raw(to_raw(&filtered)),
        Some(aggregation) => QueryOutput::Aggregate(to_aggregate(&filtered, aggregation)),
    }
}
