//! Integration tests for configuration loading

use shelf_sentinel::infra::{Config, Metrics};
use shelf_sentinel::services::ShelfEngine;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "store-12"

[server]
bind_address = "127.0.0.1"
port = 5050

[policy]
max_items = 30
low_stock_threshold = 4
theft_window_minutes = 15

[serial]
enabled = true
device = "/dev/ttyACM0"
baud = 115200

[mqtt]
enabled = true
host = "test-host"
port = 1884
topic = "store/shelves"
username = "shelf"
password = "secret"

[classifier]
enabled = true
url = "http://vision:9000/classify"
timeout_ms = 2500

[metrics]
interval_secs = 15
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "store-12");
    assert_eq!(config.server_bind_address(), "127.0.0.1");
    assert_eq!(config.server_port(), 5050);
    assert_eq!(config.policy().max_items, 30);
    assert_eq!(config.policy().low_stock_threshold, 4);
    assert_eq!(config.policy().theft_window_minutes, 15);
    // Unset policy keys keep their defaults
    assert_eq!(config.policy().alert_retention, 50);
    assert!(config.serial_enabled());
    assert_eq!(config.serial_device(), "/dev/ttyACM0");
    assert_eq!(config.serial_baud(), 115200);
    assert!(config.mqtt_enabled());
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_topic(), "store/shelves");
    assert_eq!(config.mqtt_username(), Some("shelf"));
    assert!(config.classifier_enabled());
    assert_eq!(config.classifier_url(), "http://vision:9000/classify");
    assert_eq!(config.classifier_timeout_ms(), 2500);
    assert_eq!(config.metrics_interval_secs(), 15);
    // No [shelves] section keeps the reference layout
    assert_eq!(config.shelves().len(), 2);
}

#[test]
fn test_custom_shelves() {
    let temp_file = write_config(
        r#"
[shelves.U1]
product_name = "Cereal"
force_sensor = "W1"
item_weight = 400
item_height = 30
empty_distance = 300
full_distance = 60
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.shelves().len(), 1);
    let shelf = &config.shelves()["U1"];
    assert_eq!(shelf.product_name, "Cereal");
    assert_eq!(shelf.force_sensor, "W1");
    assert_eq!(shelf.range(), 240);

    let engine = ShelfEngine::from_config(&config, Arc::new(Metrics::new())).unwrap();
    assert!(engine.ingest_reading("W1", 800));
    assert!(!engine.ingest_reading("D1", 100));
}

#[test]
fn test_misconfigured_shelf_is_fatal() {
    let temp_file = write_config(
        r#"
[shelves.D1]
product_name = "Broken"
force_sensor = "F1"
item_weight = 10
item_height = 5
empty_distance = 50
full_distance = 200
"#,
    );

    // Parsing succeeds, building the engine does not
    let config = Config::from_file(temp_file.path()).unwrap();
    assert!(ShelfEngine::from_config(&config, Arc::new(Metrics::new())).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml").unwrap();
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.site_id(), "shelves");
    assert_eq!(config.server_port(), 5000);
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.shelves().len(), 2);
}

#[test]
fn test_unparseable_file_is_an_error() {
    let temp_file = write_config("[server\nport = ");
    assert!(Config::from_file(temp_file.path()).is_err());
    assert!(Config::load_from_path(temp_file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_bad_shelf_section_does_not_fall_back_to_defaults() {
    let negative_weight = write_config(
        r#"
[shelves.S7]
product_name = "Soup"
force_sensor = "W7"
item_weight = -50
item_height = 10
empty_distance = 200
full_distance = 50
"#,
    );
    let err = Config::load_from_path(negative_weight.path().to_str().unwrap()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));

    let missing_full = write_config(
        r#"
[shelves.S7]
product_name = "Soup"
force_sensor = "W7"
item_weight = 50
item_height = 10
empty_distance = 200
"#,
    );
    assert!(Config::load_from_path(missing_full.path().to_str().unwrap()).is_err());
}

#[test]
fn test_load_from_path_reads_existing_file() {
    let temp_file = write_config("[site]\nid = \"aisle-3\"\n");
    let config = Config::load_from_path(temp_file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.site_id(), "aisle-3");
    assert_eq!(config.shelves().len(), 2);
}

#[test]
fn test_dev_config_loads() {
    let config = Config::from_file("config/dev.toml").unwrap();
    assert_eq!(config.site_id(), "dev-shelves");
    assert_eq!(config.shelves()["D2"].item_weight, 30);
    assert!(ShelfEngine::from_config(&config, Arc::new(Metrics::new())).is_ok());
}
