//! Alert and misplacement collaborator records

use crate::domain::types::{AlertKind, Confidence, Severity};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Time-stamped stock notice retained in the alert journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
}

impl Alert {
    /// Build a stock alert. The id embeds the status, sensor and timestamp
    /// (`empty-D1-2024-05-01T10:00:00.000000Z`).
    pub fn stock(
        status: &str,
        sensor_id: &str,
        title: &str,
        message: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!(
                "{status}-{sensor_id}-{}",
                timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
            ),
            title: title.to_string(),
            message,
            severity,
            timestamp,
            kind: AlertKind::Stock,
        }
    }
}

/// Input forwarded to the image-classification collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisplacementRequest {
    pub shelf_id: String,
    pub expected_product: String,
    pub image: Bytes,
}

/// Classification verdict, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisplacementResult {
    pub misplaced: bool,
    pub detected_product: String,
    pub confidence: Confidence,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stock_alert_serializes_type_field() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let alert = Alert::stock(
            "empty",
            "D1",
            "Empty Shelf Alert",
            "Product 1 shelf is empty and needs restocking".to_string(),
            Severity::High,
            ts,
        );

        assert_eq!(alert.id, "empty-D1-2024-05-01T10:00:00.000000Z");

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "stock");
        assert_eq!(json["severity"], "high");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_misplacement_result_decodes() {
        let raw = r#"{"misplaced":true,"detected_product":"Cola","confidence":"medium","details":"two cans"}"#;
        let result: MisplacementResult = serde_json::from_str(raw).unwrap();
        assert!(result.misplaced);
        assert_eq!(result.confidence, Confidence::Medium);
    }
}
