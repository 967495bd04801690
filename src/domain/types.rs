//! Shared types for the shelf engine

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::domain::error::ValidationError;

/// Stock classification for a single shelf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Empty,
    Low,
    Normal,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Empty => "empty",
            StockStatus::Low => "low",
            StockStatus::Normal => "normal",
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
        }
    }
}

/// Alert category. Only stock alerts are produced today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Stock,
}

/// Confidence tag shared by theft records and classifier results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Latest raw value reported by one sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: i64,
}

impl SensorReading {
    pub fn new(sensor_id: impl Into<String>, value: i64) -> Self {
        Self { sensor_id: sensor_id.into(), value }
    }
}

/// Readings carried by one frame. The reference wiring sends four
/// values per frame (two shelves, two sensors each).
pub type ReadingBatch = SmallVec<[SensorReading; 4]>;

/// Parse a serial frame of the form `D1:120,F1:500,D2:80,F2:300`
///
/// Whitespace around keys and values is ignored, empty segments are skipped.
/// Any segment without a colon or with a non-integer value rejects the whole
/// frame so a half-garbled line never partially updates the store.
pub fn parse_reading_line(line: &str) -> Result<ReadingBatch, ValidationError> {
    let mut batch = ReadingBatch::new();

    for part in line.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let Some((key, value)) = part.split_once(':') else {
            return Err(ValidationError::InvalidField {
                field: part.to_string(),
                reason: "expected <sensor>:<value>".to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::InvalidField {
                field: part.to_string(),
                reason: "empty sensor id".to_string(),
            });
        }

        let value = value.trim().parse::<i64>().map_err(|_| ValidationError::InvalidField {
            field: key.to_string(),
            reason: format!("not an integer: {:?}", value.trim()),
        })?;

        batch.push(SensorReading::new(key, value));
    }

    Ok(batch)
}

/// Convert a JSON object of `sensor -> integer` into readings
///
/// Integral floats (e.g. `120.0`) are accepted since some microcontroller
/// JSON encoders always emit a decimal point.
pub fn readings_from_json(value: &serde_json::Value) -> Result<ReadingBatch, ValidationError> {
    let Some(object) = value.as_object() else {
        return Err(ValidationError::InvalidField {
            field: "body".to_string(),
            reason: "expected a JSON object of sensor readings".to_string(),
        });
    };

    let mut batch = ReadingBatch::new();
    let mut malformed = Vec::new();

    for (sensor_id, raw) in object {
        match json_integer(raw) {
            Some(value) => batch.push(SensorReading::new(sensor_id.as_str(), value)),
            None => malformed.push(sensor_id.clone()),
        }
    }

    if !malformed.is_empty() {
        malformed.sort();
        return Err(ValidationError::InvalidField {
            field: malformed.join(","),
            reason: "reading must be an integer".to_string(),
        });
    }

    Ok(batch)
}

fn json_integer(raw: &serde_json::Value) -> Option<i64> {
    if let Some(v) = raw.as_i64() {
        return Some(v);
    }
    let f = raw.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a caller-supplied timestamp
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`) or a naive ISO-8601 string
/// (`2024-05-01T10:00:00.123456`), which point-of-sale terminals emit
/// without an offset. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_reading_line() {
        let batch = parse_reading_line("D1:120,F1:500, D2 : 80 ,F2:-3").unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0], SensorReading::new("D1", 120));
        assert_eq!(batch[2], SensorReading::new("D2", 80));
        assert_eq!(batch[3], SensorReading::new("F2", -3));
        assert!(!batch.spilled());
    }

    #[test]
    fn test_parse_reading_line_skips_empty_segments() {
        let batch = parse_reading_line("D1:120,,F1:500,\r\n").unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_parse_reading_line_rejects_garbage() {
        assert!(parse_reading_line("D1:120,F1").is_err());
        assert!(parse_reading_line("D1:12x").is_err());
        assert!(parse_reading_line(":5").is_err());
    }

    #[test]
    fn test_readings_from_json() {
        let value = serde_json::json!({"D1": 120, "F1": 500.0});
        let batch = readings_from_json(&value).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.contains(&SensorReading::new("F1", 500)));
    }

    #[test]
    fn test_readings_from_json_rejects_non_integers() {
        let value = serde_json::json!({"D1": "high", "F1": 1.5, "D2": 3});
        let err = readings_from_json(&value).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidField {
                field: "D1,F1".to_string(),
                reason: "reading must be an integer".to_string(),
            }
        );
        assert!(readings_from_json(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(rfc.hour(), 8);

        let naive = parse_timestamp("2024-05-01T10:00:00.250000").unwrap();
        assert_eq!(naive.hour(), 10);
        assert_eq!(naive.day(), 1);

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&StockStatus::Low).unwrap(), "\"low\"");
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(serde_json::to_string(&AlertKind::Stock).unwrap(), "\"stock\"");
        assert_eq!(StockStatus::Empty.as_str(), "empty");
    }
}
