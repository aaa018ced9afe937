//! Consistency check of the environment the reports were recorded in.
//!
//! Reports that are compared with each other should come from the same
//! operating system, device, display mode, version and resolution. Every field
//! with more than one distinct value counts as a mismatch.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::record::ReportRecord;
use crate::store::GroupedStore;

/// Placeholder for a field the report did not carry.
pub const UNKNOWN_VALUE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Consistent,
    Warning,
    Error,
}

impl Severity {
    pub fn from_mismatches(count: usize) -> Self {
        match count {
            0 => Severity::Consistent,
            1 => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Distinct values of one field, with the number of reports carrying each.
pub type FieldValues = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub records: usize,
    pub operating_system: FieldValues,
    pub device_model: FieldValues,
    pub fullscreen_mode: FieldValues,
    pub app_version: FieldValues,
    pub resolution: FieldValues,
}

impl ConsistencyReport {
    pub fn from_store(store: &GroupedStore) -> Self {
        let mut report = ConsistencyReport::default();
        for (_, record) in store.iterate() {
            report.observe(record);
        }
        report
    }

    pub fn observe(&mut self, record: &ReportRecord) {
        self.records += 1;
        count(&mut self.operating_system, record.operating_system.as_deref());
        count(&mut self.device_model, record.device_model.as_deref());
        count(&mut self.fullscreen_mode, record.fullscreen_mode.as_deref());
        count(&mut self.app_version, record.app_version.as_deref());
        let resolution = record.resolution.as_ref().map(ToString::to_string);
        count(&mut self.resolution, resolution.as_deref());
    }

    fn fields(&self) -> [(&'static str, &FieldValues); 5] {
        [
            ("Operating system", &self.operating_system),
            ("Device", &self.device_model),
            ("Fullscreen mode", &self.fullscreen_mode),
            ("Version", &self.app_version),
            ("Resolution", &self.resolution),
        ]
    }

    pub fn mismatch_count(&self) -> usize {
        self.fields()
            .iter()
            .filter(|(_, values)| values.len() > 1)
            .count()
    }

    pub fn severity(&self) -> Severity {
        Severity::from_mismatches(self.mismatch_count())
    }
}

fn count(values: &mut FieldValues, value: Option<&str>) {
    *values
        .entry(value.unwrap_or(UNKNOWN_VALUE).to_string())
        .or_default() += 1;
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} reports checked", self.records)?;
        for (name, values) in self.fields() {
            let marker = if values.len() > 1 { "MISMATCH" } else { "ok" };
            let listed: Vec<String> = values
                .iter()
                .map(|(value, n)| format!("{value} ({n})"))
                .collect();
            writeln!(f, "  {name}: {} [{marker}]", listed.join(", "))?;
        }
        write!(f, "{} mismatching fields", self.mismatch_count())
    }
}
