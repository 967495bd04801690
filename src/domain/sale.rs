//! Sale, theft and sales summary records

use crate::domain::types::Confidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason attached to every timeout-promoted theft record
pub const THEFT_REASON: &str = "no matching removal found within window";

/// Product name used when neither the sale nor the registry names one
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// Generate a new UUIDv7 (time-sortable) sale id
pub fn new_sale_id() -> String {
    Uuid::now_v7().to_string()
}

/// Sale payload as reported by the point-of-sale collaborator
///
/// Every field is optional on the wire so that validation can report all
/// missing fields at once instead of failing on the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SaleInput {
    #[serde(default)]
    pub sale_id: Option<String>,
    #[serde(default)]
    pub shelf_id: Option<String>,
    #[serde(default)]
    pub items_sold: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
}

impl SaleInput {
    pub fn new(shelf_id: &str, items_sold: i64) -> Self {
        Self {
            shelf_id: Some(shelf_id.to_string()),
            items_sold: Some(items_sold),
            ..Default::default()
        }
    }

    pub fn with_sale_id(mut self, sale_id: &str) -> Self {
        self.sale_id = Some(sale_id.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp.to_rfc3339());
        self
    }

    pub fn with_product_name(mut self, product_name: &str) -> Self {
        self.product_name = Some(product_name.to_string());
        self
    }
}

/// A validated sale pending reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sale {
    pub sale_id: String,
    pub shelf_id: String,
    pub items_sold: u32,
    pub timestamp: DateTime<Utc>,
    pub product_name: String,
}

/// Sale that was not explained within the reconciliation window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TheftRecord {
    pub sale_id: String,
    pub shelf_id: String,
    pub items_removed: u32,
    pub timestamp: DateTime<Utc>,
    pub confidence: Confidence,
    pub reason: String,
    pub product_name: String,
}

impl TheftRecord {
    pub fn from_sale(sale: &Sale) -> Self {
        Self {
            sale_id: sale.sale_id.clone(),
            shelf_id: sale.shelf_id.clone(),
            items_removed: sale.items_sold,
            timestamp: sale.timestamp,
            confidence: Confidence::High,
            reason: THEFT_REASON.to_string(),
            product_name: sale.product_name.clone(),
        }
    }
}

/// Returned by `record_sale` on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleReceipt {
    pub accepted: bool,
    pub sale: Sale,
    pub total_sale_count: usize,
}

/// Rolling view over the pending sales
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub sales: Vec<Sale>,
    pub total_sales: usize,
    /// Sales newer than one hour
    pub hourly_rate: usize,
    /// Sales newer than one day
    pub daily_rate: usize,
    pub last_sale: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}
