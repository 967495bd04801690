//! Stock estimation from paired distance and weight readings
//!
//! Pure functions only. Status and alerts are derived from the fused count
//! on every call and never cached.
//!
//! Fusion is the floor of the mean of both estimates. When one sensor reads
//! zero the count is systematically underestimated; that bias is accepted
//! and callers that want it visible can read both partial counts from
//! `ShelfEvaluation`.

use crate::domain::alert::Alert;
use crate::domain::shelf::{ShelfConfig, ShelfEvaluation, StockEstimate};
use crate::domain::types::{Severity, StockStatus};
use crate::infra::config::Policy;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct StockEstimator {
    max_items: u32,
    low_stock_threshold: u32,
}

#[inline]
fn saturate_u32(value: i128) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl StockEstimator {
    pub fn new(policy: &Policy) -> Self {
        Self { max_items: policy.max_items, low_stock_threshold: policy.low_stock_threshold }
    }

    /// `floor(max(0, empty - distance) * max_items / range)`
    ///
    /// Not clamped to `max_items`: a reading below `full_distance` reports
    /// more than capacity.
    pub fn count_from_distance(&self, cfg: &ShelfConfig, distance: i64) -> u32 {
        let range = i128::from(cfg.range());
        if range <= 0 {
            return 0;
        }
        let occupied = (i128::from(cfg.empty_distance) - i128::from(distance)).max(0);
        saturate_u32(occupied * i128::from(self.max_items) / range)
    }

    /// `floor(max(0, weight) / item_weight)`
    pub fn count_from_weight(&self, cfg: &ShelfConfig, weight: i64) -> u32 {
        if cfg.item_weight == 0 {
            return 0;
        }
        saturate_u32(i128::from(weight.max(0)) / i128::from(cfg.item_weight))
    }

    pub fn classify(&self, count: u32) -> StockStatus {
        if count == 0 {
            StockStatus::Empty
        } else if count < self.low_stock_threshold {
            StockStatus::Low
        } else {
            StockStatus::Normal
        }
    }

    pub fn fuse(&self, from_distance: u32, from_weight: u32) -> StockEstimate {
        let count = ((u64::from(from_distance) + u64::from(from_weight)) / 2) as u32;
        StockEstimate { count, status: self.classify(count) }
    }

    /// Evaluate one shelf against its two current readings
    pub fn evaluate(
        &self,
        sensor_id: &str,
        cfg: &ShelfConfig,
        distance: i64,
        weight: i64,
    ) -> ShelfEvaluation {
        let count_from_distance = self.count_from_distance(cfg, distance);
        let count_from_weight = self.count_from_weight(cfg, weight);
        ShelfEvaluation {
            sensor_id: sensor_id.to_string(),
            force_sensor: cfg.force_sensor.clone(),
            product_name: cfg.product_name.clone(),
            distance,
            weight,
            count_from_distance,
            count_from_weight,
            estimate: self.fuse(count_from_distance, count_from_weight),
        }
    }
}

/// Alert an evaluation calls for, if any
pub fn alert_for(evaluation: &ShelfEvaluation, now: DateTime<Utc>) -> Option<Alert> {
    let product = &evaluation.product_name;
    match evaluation.estimate.status {
        StockStatus::Empty => Some(Alert::stock(
            StockStatus::Empty.as_str(),
            &evaluation.sensor_id,
            "Empty Shelf Alert",
            format!("{product} shelf is empty and needs restocking"),
            Severity::High,
            now,
        )),
        StockStatus::Low => Some(Alert::stock(
            StockStatus::Low.as_str(),
            &evaluation.sensor_id,
            "Low Stock Alert",
            format!(
                "{product} shelf is running low on stock. Current count: {}",
                evaluation.estimate.count
            ),
            Severity::Medium,
            now,
        )),
        StockStatus::Normal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn estimator() -> StockEstimator {
        StockEstimator::new(&Policy::default())
    }

    fn d1() -> ShelfConfig {
        ShelfConfig {
            product_name: "Product 1".to_string(),
            force_sensor: "F1".to_string(),
            item_weight: 50,
            item_height: 10,
            empty_distance: 200,
            full_distance: 50,
        }
    }

    #[test]
    fn test_half_full_shelf() {
        let eval = estimator().evaluate("D1", &d1(), 125, 250);
        assert_eq!(eval.count_from_distance, 10);
        assert_eq!(eval.count_from_weight, 5);
        assert_eq!(eval.estimate, StockEstimate { count: 7, status: StockStatus::Normal });
    }

    #[test]
    fn test_empty_shelf() {
        let eval = estimator().evaluate("D1", &d1(), 200, 0);
        assert_eq!(eval.estimate.count, 0);
        assert_eq!(eval.estimate.status, StockStatus::Empty);
    }

    #[test]
    fn test_full_shelf() {
        let eval = estimator().evaluate("D1", &d1(), 50, 1000);
        assert_eq!(eval.estimate.count, 20);
        assert_eq!(eval.estimate.status, StockStatus::Normal);
    }

    #[test]
    fn test_low_threshold_boundary() {
        let est = estimator();
        assert_eq!(est.classify(0), StockStatus::Empty);
        assert_eq!(est.classify(1), StockStatus::Low);
        assert_eq!(est.classify(4), StockStatus::Low);
        assert_eq!(est.classify(5), StockStatus::Normal);
    }

    #[test]
    fn test_distance_beyond_empty_clamps_to_zero() {
        assert_eq!(estimator().count_from_distance(&d1(), 400), 0);
    }

    #[test]
    fn test_distance_below_full_exceeds_capacity() {
        // No upper clamp: 200 occupied over a range of 150
        assert_eq!(estimator().count_from_distance(&d1(), 0), 26);
    }

    #[test]
    fn test_negative_weight_counts_as_zero() {
        assert_eq!(estimator().count_from_weight(&d1(), -300), 0);
    }

    #[test]
    fn test_extreme_readings_saturate() {
        let est = estimator();
        assert_eq!(est.count_from_distance(&d1(), i64::MIN), u32::MAX);
        assert_eq!(est.count_from_distance(&d1(), i64::MAX), 0);
        assert_eq!(est.count_from_weight(&d1(), i64::MAX), u32::MAX);

        let eval = est.evaluate("D1", &d1(), i64::MIN, i64::MAX);
        assert_eq!(eval.estimate.count, u32::MAX);
    }

    #[test]
    fn test_single_sensor_underestimates() {
        // Weight sensor reads zero while distance says full
        let eval = estimator().evaluate("D1", &d1(), 50, 0);
        assert_eq!(eval.count_from_distance, 20);
        assert_eq!(eval.estimate.count, 10);
    }

    #[test]
    fn test_alert_for_status() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let est = estimator();

        let empty = est.evaluate("D1", &d1(), 200, 0);
        let alert = alert_for(&empty, now).unwrap();
        assert_eq!(alert.title, "Empty Shelf Alert");
        assert_eq!(alert.message, "Product 1 shelf is empty and needs restocking");
        assert_eq!(alert.severity, Severity::High);
        assert!(alert.id.starts_with("empty-D1-"));

        let low = est.evaluate("D1", &d1(), 170, 100);
        assert_eq!(low.estimate.count, 3);
        let alert = alert_for(&low, now).unwrap();
        assert_eq!(alert.title, "Low Stock Alert");
        assert_eq!(alert.message, "Product 1 shelf is running low on stock. Current count: 3");
        assert_eq!(alert.severity, Severity::Medium);

        let normal = est.evaluate("D1", &d1(), 125, 250);
        assert!(alert_for(&normal, now).is_none());
    }
}
