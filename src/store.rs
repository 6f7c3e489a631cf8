//! Flat-file record store for `datalogger-api`.
//!
//! The whole CSV file is materialized into an immutable [`Snapshot`] at
//! load time. Handlers hold an `Arc<Snapshot>` for the duration of a request;
//! [`RecordStore::reload`] and [`RecordStore::merge`] build a new snapshot and
//! swap it in, leaving in-flight requests on the one they started with.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{parse_instant, DeviceId, Reading};

// ---

/// Immutable view of every reading in the store.
#[derive(Debug, Default)]
pub struct Snapshot {
    readings: Vec<Reading>,
}

impl Snapshot {
    // ---
    pub fn new(readings: Vec<Reading>) -> Self {
        Snapshot { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// One CSV row as persisted on disk.
#[derive(Debug, Serialize, Deserialize)]
struct StoreRow {
    // ---
    id: String,
    datalogger: String,
    timestamp: String,
    precipitation: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

impl StoreRow {
    // ---
    fn from_reading(reading: &Reading) -> Self {
        StoreRow {
            id: reading.id.to_string(),
            datalogger: reading.device_id.to_string(),
            timestamp: reading.timestamp.to_rfc3339(),
            precipitation: reading.precipitation,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }

    fn into_reading(self) -> Result<Reading, String> {
        // ---
        let id = Uuid::parse_str(self.id.trim()).map_err(|e| format!("bad id '{}': {}", self.id, e))?;
        let timestamp = parse_instant(&self.timestamp)
            .ok_or_else(|| format!("bad timestamp '{}'", self.timestamp))?;

        Ok(Reading::new(
            id,
            DeviceId::new(&self.datalogger),
            timestamp,
            self.precipitation,
            self.temperature,
            self.humidity,
        ))
    }
}

/// CSV-backed store owning the current snapshot.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
}

impl RecordStore {
    // ---
    /// Open the store at `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        // ---
        let path = path.into();
        let readings = read_file(&path)?;
        tracing::info!("Loaded {} readings from {}", readings.len(), path.display());

        Ok(RecordStore {
            path,
            current: RwLock::new(Arc::new(Snapshot::new(readings))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot; cheap to call once per request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the file and swap in the result. Returns the new row count.
    pub fn reload(&self) -> Result<usize, StoreError> {
        // ---
        let readings = read_file(&self.path)?;
        let count = readings.len();
        self.swap(Snapshot::new(readings));
        tracing::info!("Reloaded {} readings from {}", count, self.path.display());
        Ok(count)
    }

    /// Upsert `incoming` by id, persist the merged table, and swap it in.
    ///
    /// Rows whose id already exists are replaced in place; the rest are
    /// appended in order. Returns the merged row count.
    pub fn merge(&self, incoming: Vec<Reading>) -> Result<usize, StoreError> {
        // ---
        let base = self.snapshot();
        let mut merged: Vec<Reading> = base.readings().to_vec();
        let mut positions: HashMap<Uuid, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id, i))
            .collect();

        let mut replaced = 0;
        for reading in incoming {
            match positions.get(&reading.id) {
                Some(&i) => {
                    merged[i] = reading;
                    replaced += 1;
                }
                None => {
                    positions.insert(reading.id, merged.len());
                    merged.push(reading);
                }
            }
        }

        write_file(&self.path, &merged)?;
        let count = merged.len();
        self.swap(Snapshot::new(merged));

        tracing::info!(
            "Store updated: {} rows ({} replaced) written to {}",
            count,
            replaced,
            self.path.display()
        );
        Ok(count)
    }

    fn swap(&self, next: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }
}

fn read_file(path: &Path) -> Result<Vec<Reading>, StoreError> {
    // ---
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!("Store file {} not found, starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut reader = csv::Reader::from_reader(file);
    let mut readings = Vec::new();

    for (i, row) in reader.deserialize::<StoreRow>().enumerate() {
        let row = row.map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let reading = row.into_reading().map_err(|reason| StoreError::InvalidRow {
            path: path.to_path_buf(),
            row: i + 1,
            reason,
        })?;
        readings.push(reading);
    }

    Ok(readings)
}

fn write_file(path: &Path, readings: &[Reading]) -> Result<(), StoreError> {
    // ---
    let tmp_path = path.with_extension("csv.tmp");
    let result = write_rows(&tmp_path, readings).and_then(|()| {
        fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_rows(tmp_path: &Path, readings: &[Reading]) -> Result<(), StoreError> {
    // ---
    let csv_err = |source: csv::Error| StoreError::Csv {
        path: tmp_path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(tmp_path).map_err(csv_err)?;
    for reading in readings {
        writer.serialize(StoreRow::from_reading(reading)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: tmp_path.to_path_buf(),
        source,
    })
}
