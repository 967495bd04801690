//! Latest raw value per known sensor
//!
//! The key set is fixed at construction (every distance sensor and its
//! paired force sensor), so the map itself is never mutated after startup
//! and each value is an independent atomic. Ingestion from several
//! transports at once never tears a value and takes no lock.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct SensorStore {
    values: FxHashMap<String, AtomicI64>,
}

impl SensorStore {
    /// Create a store for the given identifiers, all starting at 0
    pub fn new<I, S>(sensor_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = sensor_ids.into_iter().map(|id| (id.into(), AtomicI64::new(0))).collect();
        Self { values }
    }

    /// Overwrite the value for a known sensor. Returns false for an unknown
    /// identifier, leaving every stored value untouched.
    #[inline]
    pub fn ingest(&self, sensor_id: &str, value: i64) -> bool {
        match self.values.get(sensor_id) {
            Some(slot) => {
                slot.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Latest value, 0 if never ingested or unknown
    #[inline]
    pub fn read(&self, sensor_id: &str) -> i64 {
        self.values.get(sensor_id).map(|slot| slot.load(Ordering::Acquire)).unwrap_or(0)
    }

    pub fn is_known(&self, sensor_id: &str) -> bool {
        self.values.contains_key(sensor_id)
    }

    /// Every known identifier with its current value, ordered by identifier
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.values
            .iter()
            .map(|(id, slot)| (id.clone(), slot.load(Ordering::Acquire)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
