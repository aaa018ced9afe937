//! JSON parser for benchmark report documents.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RecordError;
use crate::record::{ReportRecord, Resolution};

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportDocument {
    timings: String,
    device_model: Option<String>,
    operating_system: Option<String>,
    constellation_version: Option<String>,
    display_resolution: Option<Resolution>,
    fullscreen_mode: Option<Value>,
}

/// Decodes a report document into a [`ReportRecord`].
///
/// `Timings` holds comma-separated frame durations in seconds; they are stored
/// in milliseconds. `source` is the file name the bytes came from.
///
/// # Errors
///
/// Returns an error if the bytes are not a JSON report or a timing entry is
/// not a number.
pub fn parse_report(bytes: &[u8], source: &str) -> Result<ReportRecord, RecordError> {
    let doc: ReportDocument = serde_json::from_slice(bytes)?;
    let timings = parse_timings(&doc.timings)?;

    let mut record = ReportRecord::new(timings, source);
    record.device_model = doc.device_model;
    record.operating_system = doc.operating_system;
    record.app_version = doc.constellation_version;
    record.resolution = doc.display_resolution;
    record.fullscreen_mode = doc.fullscreen_mode.map(|mode| match mode {
        Value::String(s) => s,
        other => other.to_string(),
    });

    Ok(record)
}

fn parse_timings(raw: &str) -> Result<Vec<f64>, RecordError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw.split(',')
        .enumerate()
        .map(|(index, value)| {
            value
                .trim()
                .parse::<f64>()
                .map(|seconds| seconds * 1000.0)
                .map_err(|_| RecordError::InvalidTiming {
                    index,
                    value: value.to_string(),
                })
        })
        .collect()
}
