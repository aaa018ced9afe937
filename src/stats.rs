use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::utility::{mean, stddev};
use crate::record::ReportRecord;
use crate::store::KEY_SEPARATOR;

/// Frame time budget of a 60 Hz display, in milliseconds.
pub const FRAME_BUDGET_MS: f64 = 1000.0 / 60.0;

#[derive(Debug, Default, Serialize)]
pub struct FrameStats {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub source: String,
    pub device: Option<String>,
    pub version: Option<String>,

    // series
    pub total_frames: usize,
    pub total_duration_ms: f64,
    pub average_frame_time_ms: f64,
    pub average_fps: f64,
    pub frame_time_std_ms: f64,

    // slow frames
    pub one_percent_low_ms: f64,
    pub point_one_percent_low_ms: f64,
    pub longest_frame_ms: f64,
    pub frames_over_budget: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl FrameStats {
    pub fn from_record(key: &[String], record: &ReportRecord) -> Self {
        let mut s = FrameStats {
            timestamp: Utc::now(),
            key: key.join(KEY_SEPARATOR),
            source: record.source.clone(),
            device: record.device_model.clone(),
            version: record.app_version.clone(),
            ..Default::default()
        };

        let timings = &record.timings;
        s.total_frames = timings.len();
        if timings.is_empty() {
            return s;
        }

        s.total_duration_ms = timings.iter().sum();
        s.average_frame_time_ms = mean(timings);
        s.frame_time_std_ms = stddev(timings, s.average_frame_time_ms);
        if s.average_frame_time_ms > 0.0 {
            s.average_fps = 1000.0 / s.average_frame_time_ms;
        }

        let mut slowest_first = timings.clone();
        slowest_first.sort_by(|a, b| b.total_cmp(a));
        let n = slowest_first.len();
        s.longest_frame_ms = slowest_first[0];
        s.one_percent_low_ms = slowest_first[n / 100];
        s.point_one_percent_low_ms = slowest_first[n / 1000];
        s.frames_over_budget = timings.iter().filter(|&&t| t > FRAME_BUDGET_MS).count();

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn over_budget_pct(&self) -> f64 {
        Self::pct(self.frames_over_budget, self.total_frames)
    }

    /// Create an error record for a report that could not be loaded
    pub fn from_error(source: &str, error_type: &str, error_message: &str) -> Self {
        FrameStats {
            timestamp: Utc::now(),
            source: source.to_string(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }
}
