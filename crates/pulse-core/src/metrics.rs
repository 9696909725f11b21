//! Metrics snapshot and stored record types

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Keys a loosely-typed record must carry to be accepted
pub const REQUIRED_FIELDS: [&str; 8] = [
    "time_lapse",
    "monitoring_time",
    "cpu_percent",
    "gpu_load",
    "ram_free_mb",
    "ram_total_mb",
    "disk_free_gb",
    "disk_total_gb",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("metrics record is not an object")]
    NotAnObject,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("field {0} is not numeric")]
    NotNumeric(&'static str),
    #[error("field {0} is not text")]
    NotText(&'static str),
    #[error("field {0} is not a YYYY-MM-DD date")]
    InvalidDate(&'static str),
    #[error("sampling interval must be a positive number of seconds")]
    NonPositiveInterval,
    #[error("field {0} is not a finite number")]
    NotFinite(&'static str),
}

/// One sampled point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sampling interval in effect, seconds
    pub time_lapse: u32,
    pub captured_on: NaiveDate,
    /// Elapsed session time as `MM:SS`
    pub monitoring_time: String,
    pub cpu_percent: f64,
    pub gpu_load: f64,
    pub ram_free_mb: f64,
    pub ram_total_mb: f64,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
}

impl MetricsSnapshot {
    /// Build a snapshot from a loosely-typed record, coercing numeric strings.
    ///
    /// Every key in [`REQUIRED_FIELDS`] must be present. `captured_on` is
    /// optional and defaults to today.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        if let Some(missing) = REQUIRED_FIELDS.iter().find(|key| !obj.contains_key(**key)) {
            return Err(ValidationError::MissingField(*missing));
        }

        let captured_on = match obj.get("captured_on") {
            None | Some(Value::Null) => Local::now().date_naive(),
            Some(Value::String(s)) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|_| ValidationError::InvalidDate("captured_on"))?,
            Some(_) => return Err(ValidationError::InvalidDate("captured_on")),
        };

        let monitoring_time = match obj.get("monitoring_time") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(ValidationError::NotText("monitoring_time")),
        };

        let snapshot = Self {
            time_lapse: interval(obj)?,
            captured_on,
            monitoring_time,
            cpu_percent: number(obj, "cpu_percent")?,
            gpu_load: number(obj, "gpu_load")?,
            ram_free_mb: number(obj, "ram_free_mb")?,
            ram_total_mb: number(obj, "ram_total_mb")?,
            disk_free_gb: number(obj, "disk_free_gb")?,
            disk_total_gb: number(obj, "disk_total_gb")?,
        };

        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the invariants a typed snapshot cannot express on its own
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.time_lapse == 0 {
            return Err(ValidationError::NonPositiveInterval);
        }

        let fields = [
            ("cpu_percent", self.cpu_percent),
            ("gpu_load", self.gpu_load),
            ("ram_free_mb", self.ram_free_mb),
            ("ram_total_mb", self.ram_total_mb),
            ("disk_free_gb", self.disk_free_gb),
            ("disk_total_gb", self.disk_total_gb),
        ];

        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(ValidationError::NotFinite(*name)),
            None => Ok(()),
        }
    }
}

fn number(obj: &Map<String, Value>, key: &'static str) -> Result<f64, ValidationError> {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().ok_or(ValidationError::NotNumeric(key)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::NotNumeric(key)),
        _ => Err(ValidationError::NotNumeric(key)),
    }
}

fn interval(obj: &Map<String, Value>) -> Result<u32, ValidationError> {
    let key = "time_lapse";
    let raw = match obj.get(key) {
        Some(Value::Number(n)) => n.as_i64().ok_or(ValidationError::NotNumeric(key))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::NotNumeric(key))?,
        _ => return Err(ValidationError::NotNumeric(key)),
    };

    if raw <= 0 {
        return Err(ValidationError::NonPositiveInterval);
    }
    u32::try_from(raw).map_err(|_| ValidationError::NotNumeric(key))
}

/// A persisted snapshot with its auto-incrementing identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
}

/// Render elapsed session time as `MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
