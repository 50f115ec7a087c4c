//! Decoding of exported diagnosis history.
//!
//! The history endpoint is not strict about shapes, so decoding here is
//! tolerant: entries that cannot be read are logged and skipped rather than
//! failing the whole load.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::DiagnosisRecord;

/// Keys that may wrap the record array in an object payload.
const HISTORY_KEYS: [&str; 3] = ["history", "diagnoses", "records"];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
}

fn read_file(path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Decodes a history payload: a bare array, or an object wrapping one.
/// Any other JSON shape yields no records.
pub fn parse_history_json(text: &str) -> Result<Vec<DiagnosisRecord>, SourceError> {
    let payload: Value = serde_json::from_str(text)?;

    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut fields) => match HISTORY_KEYS.iter().find_map(|key| fields.remove(*key)) {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("history payload has no record array, treating as empty");
                Vec::new()
            }
        },
        _ => {
            warn!("history payload is not an array, treating as empty");
            Vec::new()
        }
    };

    Ok(decode_entries(items))
}

fn decode_entries(items: Vec<Value>) -> Vec<DiagnosisRecord> {
    let total = items.len();
    let records: Vec<DiagnosisRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(index, error = %err, "skipping undecodable history entry");
                None
            }
        })
        .collect();

    debug!(total, decoded = records.len(), "decoded history entries");
    records
}

/// Number of patients in a `{ "patients": [...] }` payload.
pub fn parse_patients_json(text: &str) -> Result<usize, SourceError> {
    let payload: Value = serde_json::from_str(text)?;
    let count = match &payload {
        Value::Array(patients) => patients.len(),
        Value::Object(fields) => fields
            .get("patients")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        _ => 0,
    };
    Ok(count)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: Option<String>,
    #[serde(alias = "patientId")]
    patient_id: Option<String>,
    #[serde(alias = "patientName")]
    patient_name: Option<String>,
    age: Option<String>,
    sex: Option<String>,
    diagnosis: Option<String>,
    confidence: Option<String>,
    timestamp: Option<String>,
}

impl From<CsvRow> for DiagnosisRecord {
    fn from(row: CsvRow) -> Self {
        DiagnosisRecord {
            id: row.id,
            patient_id: row.patient_id,
            patient_name: row.patient_name,
            age: row.age.and_then(|age| age.trim().parse().ok()),
            sex: row.sex,
            diagnosis: row.diagnosis,
            confidence: row
                .confidence
                .and_then(|confidence| confidence.trim().parse::<f64>().ok())
                .filter(|confidence| confidence.is_finite()),
            timestamp: row.timestamp,
        }
    }
}

/// Reads a headed CSV export. Rows that fail to decode are skipped; I/O
/// failures abort the read.
pub fn read_history_csv<R: Read>(reader: R) -> Result<Vec<DiagnosisRecord>, SourceError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        match result {
            Ok(row) => records.push(DiagnosisRecord::from(row)),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => warn!(row = index + 1, error = %err, "skipping undecodable CSV row"),
        }
    }

    debug!(decoded = records.len(), "read CSV history");
    Ok(records)
}

pub fn load_history_json(path: &Path) -> Result<Vec<DiagnosisRecord>, SourceError> {
    parse_history_json(&read_file(path)?)
}

pub fn load_history_csv(path: &Path) -> Result<Vec<DiagnosisRecord>, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_history_csv(file)
}

pub fn load_patient_count(path: &Path) -> Result<usize, SourceError> {
    parse_patients_json(&read_file(path)?)
}
