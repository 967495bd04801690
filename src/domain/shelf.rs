//! Shelf calibration and stock estimate types

use crate::domain::types::StockStatus;
use serde::{Deserialize, Serialize};

/// Calibration and product metadata for one instrumented shelf
///
/// Keyed by the distance sensor identifier in the registry. Distances are in
/// the sensor's native unit (mm-equivalent), weights in grams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfConfig {
    pub product_name: String,
    /// Identifier of the paired force sensor
    pub force_sensor: String,
    /// Weight of one item in grams
    pub item_weight: u32,
    /// Height of one item in cm (metadata only)
    pub item_height: u32,
    /// Distance reading when the shelf is empty
    pub empty_distance: i64,
    /// Distance reading when the shelf is full
    pub full_distance: i64,
}

impl ShelfConfig {
    /// Calibrated distance span. Positive for every registered shelf.
    #[inline]
    pub fn range(&self) -> i64 {
        self.empty_distance - self.full_distance
    }
}

/// Fused item count for one shelf. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockEstimate {
    pub count: u32,
    pub status: StockStatus,
}

/// Pure result of evaluating one shelf against the current readings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfEvaluation {
    pub sensor_id: String,
    pub force_sensor: String,
    pub product_name: String,
    pub distance: i64,
    pub weight: i64,
    pub count_from_distance: u32,
    pub count_from_weight: u32,
    pub estimate: StockEstimate,
}

/// Status entry reported per sensor id by `get_shelf_status`
///
/// The distance sensor entry carries the raw `height` reading, the force
/// sensor entry the raw `weight` reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShelfStatusEntry {
    pub objects_count: u32,
    pub status: StockStatus,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

impl ShelfEvaluation {
    /// Entry keyed by the distance sensor
    pub fn distance_entry(&self) -> ShelfStatusEntry {
        ShelfStatusEntry {
            objects_count: self.estimate.count,
            status: self.estimate.status,
            product_name: self.product_name.clone(),
            height: Some(self.distance),
            weight: None,
        }
    }

    /// Entry keyed by the paired force sensor
    pub fn force_entry(&self) -> ShelfStatusEntry {
        ShelfStatusEntry {
            objects_count: self.estimate.count,
            status: self.estimate.status,
            product_name: self.product_name.clone(),
            height: None,
            weight: Some(self.weight),
        }
    }
}
