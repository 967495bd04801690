//! Static shelf registry
//!
//! Maps each distance sensor to its force sensor, calibration and product.
//! Validated once at construction; a registry that exists is well-formed.

use crate::domain::error::ConfigurationError;
use crate::domain::shelf::ShelfConfig;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct ShelfRegistry {
    shelves: BTreeMap<String, ShelfConfig>,
}

impl ShelfRegistry {
    /// Validate and build the registry
    ///
    /// Rejects a shelf whose calibration range is not positive, whose item
    /// weight is zero, or whose sensor ids are empty or shared with another
    /// shelf.
    pub fn new(shelves: BTreeMap<String, ShelfConfig>) -> Result<Self, ConfigurationError> {
        let invalid = |shelf_id: &str, reason: String| ConfigurationError::InvalidShelf {
            shelf_id: shelf_id.to_string(),
            reason,
        };

        let mut seen: HashSet<&str> = shelves.keys().map(String::as_str).collect();

        for (shelf_id, cfg) in &shelves {
            if shelf_id.trim().is_empty() {
                return Err(invalid(shelf_id, "distance sensor id is empty".to_string()));
            }
            if cfg.empty_distance <= cfg.full_distance {
                return Err(invalid(
                    shelf_id,
                    format!(
                        "empty_distance ({}) must exceed full_distance ({})",
                        cfg.empty_distance, cfg.full_distance
                    ),
                ));
            }
            if cfg.item_weight == 0 {
                return Err(invalid(shelf_id, "item_weight must be positive".to_string()));
            }
            if cfg.force_sensor.trim().is_empty() {
                return Err(invalid(shelf_id, "force_sensor is empty".to_string()));
            }
            if !seen.insert(cfg.force_sensor.as_str()) {
                return Err(invalid(
                    shelf_id,
                    format!("force_sensor {} is already assigned", cfg.force_sensor),
                ));
            }
        }

        Ok(Self { shelves })
    }

    pub fn get(&self, shelf_id: &str) -> Option<&ShelfConfig> {
        self.shelves.get(shelf_id)
    }

    /// Shelves in ascending distance sensor order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShelfConfig)> {
        self.shelves.iter()
    }

    pub fn shelves(&self) -> &BTreeMap<String, ShelfConfig> {
        &self.shelves
    }

    /// Every distance and force sensor id
    pub fn sensor_ids(&self) -> Vec<String> {
        self.shelves
            .iter()
            .flat_map(|(id, cfg)| [id.clone(), cfg.force_sensor.clone()])
            .collect()
    }

    pub fn product_for(&self, shelf_id: &str) -> Option<&str> {
        self.shelves.get(shelf_id).map(|cfg| cfg.product_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.shelves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shelves.is_empty()
    }
}
