//! Domain models - shelf, sale, theft and alert types
//!
//! This module contains the canonical data types used throughout the system:
//! - `ShelfConfig` / `StockEstimate` - shelf calibration and fused stock
//! - `Sale` / `TheftRecord` - point-of-sale records and their reconciliation outcome
//! - `Alert` - bounded-journal stock notices
//! - `SensorReading` - raw sensor values and their wire parsers
//! - `error` - typed validation, configuration and classifier failures

pub mod alert;
pub mod error;
pub mod sale;
pub mod shelf;
pub mod types;

// Re-export commonly used types at module level
pub use alert::{Alert, MisplacementRequest, MisplacementResult};
pub use error::{ClassifierError, ConfigurationError, ValidationError};
pub use sale::{Sale, SaleInput, SaleReceipt, SalesSummary, TheftRecord};
pub use shelf::{ShelfConfig, ShelfEvaluation, ShelfStatusEntry, StockEstimate};
pub use types::{Confidence, SensorReading, Severity, StockStatus};
