use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde::Deserialize;
use tower::ServiceExt;

use datalogger_api::{routes, RecordStore};

#[derive(Debug, Deserialize)]
struct RawRow {
    label: String,
    measured_at: DateTime<Utc>,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    label: String,
    time_slot: DateTime<Utc>,
    value: f64,
}

const STORE_CSV: &str = "\
id,datalogger,timestamp,precipitation,temperature,humidity
0b3f6c1e-0d4e-4a53-9a55-000000000001,1,2023-01-01T00:00:00+00:00,1.0,20.0,50.0
0b3f6c1e-0d4e-4a53-9a55-000000000002,1,2023-01-02T00:00:00+00:00,2.0,25.0,60.0
0b3f6c1e-0d4e-4a53-9a55-000000000003,1,2023-01-03T00:00:00+00:00,3.0,30.0,70.0
0b3f6c1e-0d4e-4a53-9a55-000000000004,1,2023-01-05T08:00:00+00:00,,10.0,40.0
0b3f6c1e-0d4e-4a53-9a55-000000000005,1,2023-01-05T20:00:00+00:00,,14.0,NaN
0b3f6c1e-0d4e-4a53-9a55-000000000006,2,2023-01-01T00:00:00+00:00,9.0,9.0,9.0
";

/// Router over a store seeded with `contents`; the tempdir must outlive it.
fn app_with(contents: Option<&str>) -> Result<(Router, tempfile::TempDir)> {
    // ---
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("database.csv");
    if let Some(contents) = contents {
        std::fs::write(&path, contents)?;
    }
    let store = Arc::new(RecordStore::load(&path)?);
    Ok((routes::router(store), dir))
}

async fn get(app: Router, uri: &str) -> Result<(StatusCode, Option<String>, Vec<u8>)> {
    // ---
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, content_type, bytes.to_vec()))
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, d, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn data_endpoint_returns_raw_triples() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;
    let (status, _, body) = get(
        app,
        "/api/data?datalogger=1&since=2023-01-01T00:00:00&before=2023-01-04T00:00:00",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    let rows: Vec<RawRow> = serde_json::from_slice(&body)?;
    assert_eq!(rows.len(), 9);

    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        ["precip", "temp", "hum", "precip", "temp", "hum", "precip", "temp", "hum"]
    );
    let values: Vec<Option<f64>> = rows.iter().map(|r| r.value).collect();
    assert_eq!(
        values,
        [1.0, 20.0, 50.0, 2.0, 25.0, 60.0, 3.0, 30.0, 70.0].map(Some)
    );
    assert_eq!(rows[0].measured_at, day(1));
    assert_eq!(rows[8].measured_at, day(3));

    Ok(())
}

#[tokio::test]
async fn data_endpoint_emits_null_for_missing_values() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;
    let (status, _, body) = get(app, "/api/data?datalogger=1&since=2023-01-05").await?;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    let rows = json.as_array().expect("list body");
    assert_eq!(rows.len(), 6);
    assert!(rows[0]["value"].is_null());
    assert_eq!(rows[1]["value"], 10.0);
    assert!(rows[5]["value"].is_null());

    Ok(())
}

#[tokio::test]
async fn summary_day_mean_and_omitted_buckets() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;
    let (status, _, body) = get(app, "/api/summary?datalogger=1&span=day").await?;

    assert_eq!(status, StatusCode::OK);
    let rows: Vec<SummaryRow> = serde_json::from_slice(&body)?;

    // Three full days, then 2023-01-05 with no precipitation at all.
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[3].time_slot, day(2));
    assert_eq!(rows[3].label, "precip");
    assert_eq!(rows[3].value, 2.0);

    let fifth: Vec<(&str, f64)> = rows
        .iter()
        .filter(|r| r.time_slot == day(5))
        .map(|r| (r.label.as_str(), r.value))
        .collect();
    assert_eq!(fifth, [("temp", 12.0), ("hum", 40.0)]);

    Ok(())
}

#[tokio::test]
async fn infinite_store_values_are_treated_as_absent() -> Result<()> {
    // ---
    let csv = "\
id,datalogger,timestamp,precipitation,temperature,humidity
0b3f6c1e-0d4e-4a53-9a55-000000000011,1,2023-01-01T00:00:00+00:00,inf,20.0,50.0
0b3f6c1e-0d4e-4a53-9a55-000000000012,1,2023-01-01T01:00:00+00:00,-inf,22.0,54.0
";
    let (app, _dir) = app_with(Some(csv))?;

    let (status, _, body) = get(app.clone(), "/api/summary?datalogger=1&span=day").await?;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<SummaryRow> = serde_json::from_slice(&body)?;
    let summary: Vec<(&str, f64)> = rows.iter().map(|r| (r.label.as_str(), r.value)).collect();
    assert_eq!(summary, [("temp", 21.0), ("hum", 52.0)]);
    assert!(rows.iter().all(|r| r.time_slot == day(1)));

    let (status, _, body) = get(app, "/api/data?datalogger=1").await?;
    assert_eq!(status, StatusCode::OK);
    let raw: Vec<RawRow> = serde_json::from_slice(&body)?;
    assert_eq!(raw.len(), 6);
    assert_eq!(raw[0].label, "precip");
    assert_eq!(raw[0].value, None);
    assert_eq!(raw[3].value, None);
    assert_eq!(raw[4].value, Some(22.0));

    Ok(())
}

#[tokio::test]
async fn summary_max_and_explicit_reducer_agree() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;
    let (_, _, legacy) = get(app.clone(), "/api/summary?datalogger=1&span=max&since=2023-01-05").await?;
    let (_, _, explicit) = get(
        app,
        "/api/summary?datalogger=1&span=day&reducer=max&since=2023-01-05",
    )
    .await?;

    let legacy: Vec<SummaryRow> = serde_json::from_slice(&legacy)?;
    let explicit: Vec<SummaryRow> = serde_json::from_slice(&explicit)?;
    let values: Vec<f64> = legacy.iter().map(|r| r.value).collect();
    assert_eq!(values, [14.0, 40.0]);
    assert_eq!(
        values,
        explicit.iter().map(|r| r.value).collect::<Vec<_>>()
    );

    Ok(())
}

#[tokio::test]
async fn summary_without_span_is_raw() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;
    let (status, _, body) = get(app, "/api/summary?datalogger=2&span=raw").await?;

    assert_eq!(status, StatusCode::OK);
    let rows: Vec<RawRow> = serde_json::from_slice(&body)?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.value == Some(9.0)));

    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_client_errors() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;

    for uri in [
        "/api/data",
        "/api/data?datalogger=",
        "/api/data?datalogger=1&since=not-a-date",
        "/api/data?datalogger=1&since=2023-01-03&before=2023-01-01",
        "/api/summary?datalogger=1&span=D",
        "/api/summary?datalogger=1&span=max&reducer=mean",
    ] {
        let (status, _, body) = get(app.clone(), uri).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        let json: serde_json::Value = serde_json::from_slice(&body)?;
        assert!(json["error"].is_string(), "{}", uri);
    }

    Ok(())
}

#[tokio::test]
async fn missing_store_serves_empty_lists() -> Result<()> {
    // ---
    let (app, _dir) = app_with(None)?;

    for uri in [
        "/api/data?datalogger=1",
        "/api/summary?datalogger=1&span=hour",
        "/api/summary?datalogger=1&span=max",
    ] {
        let (status, _, body) = get(app.clone(), uri).await?;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body, b"[]", "{}", uri);
    }

    Ok(())
}

#[tokio::test]
async fn landing_page_and_health() -> Result<()> {
    // ---
    let (app, _dir) = app_with(Some(STORE_CSV))?;

    let (status, content_type, _) = get(app.clone(), "/").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap_or_default().contains("text/html"));

    let (status, _, body) = get(app, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["readings"], 6);

    Ok(())
}
