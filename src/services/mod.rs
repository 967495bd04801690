//! Services - shelf state and reconciliation logic
//!
//! - `engine` - `ShelfEngine`, owner of every component below
//! - `sensor_store` - latest reading per known sensor (lock-free)
//! - `shelf_registry` - validated shelf calibration
//! - `stock_estimator` - distance/weight fusion and stock alerts
//! - `sale_ledger` - pending sales and sale validation
//! - `theft_reconciler` - time-windowed promotion of sales to theft records
//! - `alert_journal` - bounded alert history
//! - `classifier` - misplacement classifier boundary

pub mod alert_journal;
pub mod classifier;
pub mod engine;
pub mod sale_ledger;
pub mod sensor_store;
pub mod shelf_registry;
pub mod stock_estimator;
pub mod theft_reconciler;

// Re-export commonly used types
pub use classifier::{DisabledClassifier, HttpClassifier, MisplacementClassifier};
pub use engine::{IngestReport, ShelfEngine};
