//! Pending sales awaiting reconciliation
//!
//! Sales are appended by `record_sale` and only ever removed by the theft
//! sweep. The ledger lock is always taken after the theft lock.

use crate::domain::error::ValidationError;
use crate::domain::sale::{new_sale_id, Sale, SaleInput, SalesSummary, UNKNOWN_PRODUCT};
use crate::domain::types::parse_timestamp;
use crate::services::shelf_registry::ShelfRegistry;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};

/// Turn a raw sale payload into a `Sale`
///
/// Reports every missing required field at once, then the first malformed
/// value. A missing id or timestamp is synthesized from `now`.
pub fn validate_sale(
    input: SaleInput,
    registry: &ShelfRegistry,
    now: DateTime<Utc>,
) -> Result<Sale, ValidationError> {
    let mut missing = Vec::new();
    if input.shelf_id.is_none() {
        missing.push("shelf_id".to_string());
    }
    if input.items_sold.is_none() {
        missing.push("items_sold".to_string());
    }
    let (Some(shelf_id), Some(items_sold)) = (input.shelf_id, input.items_sold) else {
        return Err(ValidationError::MissingFields(missing));
    };

    let invalid = |field: &str, reason: String| ValidationError::InvalidField {
        field: field.to_string(),
        reason,
    };

    let shelf_id = shelf_id.trim().to_string();
    if shelf_id.is_empty() {
        return Err(invalid("shelf_id", "must not be empty".to_string()));
    }

    if items_sold < 1 {
        return Err(invalid("items_sold", format!("must be at least 1, got {items_sold}")));
    }
    let items_sold = u32::try_from(items_sold)
        .map_err(|_| invalid("items_sold", format!("too large: {items_sold}")))?;

    let timestamp = match input.timestamp.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .ok_or_else(|| invalid("timestamp", format!("unparseable timestamp {raw:?}")))?,
        None => now,
    };

    let sale_id = match input.sale_id {
        Some(id) if id.trim().is_empty() => {
            return Err(invalid("sale_id", "must not be empty".to_string()));
        }
        Some(id) => id,
        None => new_sale_id(),
    };

    let product_name = input
        .product_name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| registry.product_for(&shelf_id).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());

    Ok(Sale { sale_id, shelf_id, items_sold, timestamp, product_name })
}

#[derive(Debug, Default)]
pub struct SaleLedger {
    sales: Mutex<Vec<Sale>>,
}

impl SaleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for callers that must combine the ledger with the
    /// theft collection. Take the theft lock first.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<Sale>> {
        self.sales.lock()
    }

    pub fn snapshot(&self) -> Vec<Sale> {
        self.sales.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sales.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sales.lock().is_empty()
    }

    /// Rolling view of pending sales relative to `now`
    pub fn summary(&self, now: DateTime<Utc>) -> SalesSummary {
        let sales = self.snapshot();
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::hours(24);

        SalesSummary {
            total_sales: sales.len(),
            hourly_rate: sales.iter().filter(|s| s.timestamp > hour_ago).count(),
            daily_rate: sales.iter().filter(|s| s.timestamp > day_ago).count(),
            last_sale: sales.last().map(|s| s.timestamp),
            sales,
            timestamp: now,
        }
    }
}
