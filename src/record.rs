//! The immutable leaf of the grouped store: one benchmark run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Display mode the benchmark ran in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "refreshRate", default)]
    pub refresh_rate: f64,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh_rate)
    }
}

/// A single ingested report: per-frame durations in milliseconds plus the
/// metadata describing where and how they were recorded.
///
/// Created once at load time and shared (behind `Arc`) by every store derived
/// from the one it was loaded into.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRecord {
    pub timings: Vec<f64>,
    pub device_model: Option<String>,
    pub operating_system: Option<String>,
    pub app_version: Option<String>,
    pub resolution: Option<Resolution>,
    pub fullscreen_mode: Option<String>,
    /// File name the record was read from
    pub source: String,
    /// File name without its extension
    pub basename: String,
}

impl ReportRecord {
    pub fn new(timings: Vec<f64>, source: &str) -> Self {
        let basename = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source)
            .to_string();

        ReportRecord {
            timings,
            source: source.to_string(),
            basename,
            ..Default::default()
        }
    }

    /// Set device metadata (model and operating system)
    pub fn with_device(mut self, device_model: &str, operating_system: &str) -> Self {
        self.device_model = Some(device_model.to_string());
        self.operating_system = Some(operating_system.to_string());
        self
    }

    /// Set application and display metadata
    pub fn with_environment(
        mut self,
        app_version: &str,
        resolution: Resolution,
        fullscreen_mode: &str,
    ) -> Self {
        self.app_version = Some(app_version.to_string());
        self.resolution = Some(resolution);
        self.fullscreen_mode = Some(fullscreen_mode.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn mean(&self) -> f64 {
        crate::aggregate::utility::mean(&self.timings)
    }
}
