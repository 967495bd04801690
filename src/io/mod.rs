//! IO modules - external system interfaces
//!
//! - `http_api` - JSON HTTP API (hyper) over the shelf engine
//! - `prometheus` - Prometheus text exposition served at /metrics
//! - `serial_bridge` - line-oriented serial link to the sensor microcontroller
//! - `mqtt` - MQTT subscriber for sensor readings

pub mod http_api;
pub mod mqtt;
pub mod prometheus;
pub mod serial_bridge;

// Re-export commonly used types
pub use http_api::{start_api_server, ApiState};
pub use mqtt::start_mqtt_ingest;
pub use serial_bridge::SerialBridge;
