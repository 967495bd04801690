//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults, policy)
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, Policy};
pub use metrics::Metrics;
