//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! A missing file falls back to the built-in defaults, which reproduce the
//! reference two-shelf deployment. A file that exists but cannot be read or
//! parsed is an error. Shelf calibration is validated later, when the engine
//! is built, and is fatal there as well.

use crate::domain::error::ConfigurationError;
use crate::domain::shelf::ShelfConfig;
use anyhow::Context;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Tunable numeric policy of the shelf engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Policy {
    /// Shelf capacity used to scale the distance estimate
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Counts strictly below this (and above zero) are "low"
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: u32,
    /// Age after which an unexplained sale becomes a potential theft
    #[serde(default = "default_theft_window_minutes")]
    pub theft_window_minutes: u32,
    /// Alerts kept in the journal
    #[serde(default = "default_alert_retention")]
    pub alert_retention: usize,
    /// Theft records kept in the theft collection
    #[serde(default = "default_theft_retention")]
    pub theft_retention: usize,
}

fn default_max_items() -> u32 {
    20
}

fn default_low_stock_threshold() -> u32 {
    5
}

fn default_theft_window_minutes() -> u32 {
    10
}

fn default_alert_retention() -> usize {
    50
}

fn default_theft_retention() -> usize {
    20
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            low_stock_threshold: default_low_stock_threshold(),
            theft_window_minutes: default_theft_window_minutes(),
            alert_retention: default_alert_retention(),
            theft_retention: default_theft_retention(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigurationError::InvalidPolicy {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.max_items == 0 {
            return invalid("max_items", "must be at least 1");
        }
        if self.alert_retention == 0 {
            return invalid("alert_retention", "must be at least 1");
        }
        if self.theft_retention == 0 {
            return invalid("theft_retention", "must be at least 1");
        }
        Ok(())
    }

    pub fn theft_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.theft_window_minutes))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_server_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
}

fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_serial_baud() -> u32 {
    9600
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { enabled: false, device: default_serial_device(), baud: default_serial_baud() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "shelves/readings".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_classifier_url")]
    pub url: String,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_classifier_url() -> String {
    "http://localhost:8080/classify".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    10_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_classifier_url(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "store-12")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "shelves".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Keyed by distance sensor id
    #[serde(default)]
    pub shelves: HashMap<String, ShelfConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    server_bind_address: String,
    server_port: u16,
    policy: Policy,
    metrics_interval_secs: u64,
    serial_enabled: bool,
    serial_device: String,
    serial_baud: u32,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    classifier_enabled: bool,
    classifier_url: String,
    classifier_timeout_ms: u64,
    shelves: BTreeMap<String, ShelfConfig>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            server_bind_address: default_bind_address(),
            server_port: default_server_port(),
            policy: Policy::default(),
            metrics_interval_secs: default_metrics_interval(),
            serial_enabled: false,
            serial_device: default_serial_device(),
            serial_baud: default_serial_baud(),
            mqtt_enabled: false,
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_topic: default_mqtt_topic(),
            mqtt_username: None,
            mqtt_password: None,
            classifier_enabled: false,
            classifier_url: default_classifier_url(),
            classifier_timeout_ms: default_classifier_timeout_ms(),
            shelves: Self::default_shelves(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Reference deployment: two shelves, each with an ultrasonic distance
    /// sensor (D*) and a force sensor (F*)
    fn default_shelves() -> BTreeMap<String, ShelfConfig> {
        let mut shelves = BTreeMap::new();
        shelves.insert(
            "D1".to_string(),
            ShelfConfig {
                product_name: "Product 1".to_string(),
                force_sensor: "F1".to_string(),
                item_weight: 50,
                item_height: 10,
                empty_distance: 200,
                full_distance: 50,
            },
        );
        shelves.insert(
            "D2".to_string(),
            ShelfConfig {
                product_name: "Product 2".to_string(),
                force_sensor: "F2".to_string(),
                item_weight: 30,
                item_height: 8,
                empty_distance: 200,
                full_distance: 50,
            },
        );
        shelves
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // An empty [shelves] section keeps the reference layout
        let shelves = if toml_config.shelves.is_empty() {
            Self::default_shelves()
        } else {
            toml_config.shelves.into_iter().collect()
        };

        Ok(Self {
            site_id: toml_config.site.id,
            server_bind_address: toml_config.server.bind_address,
            server_port: toml_config.server.port,
            policy: toml_config.policy,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            serial_enabled: toml_config.serial.enabled,
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            classifier_enabled: toml_config.classifier.enabled,
            classifier_url: toml_config.classifier.url,
            classifier_timeout_ms: toml_config.classifier.timeout_ms,
            shelves,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - defaults when the file is absent, otherwise the
    /// file must parse
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            eprintln!("Warning: config file {path} not found. Using defaults.");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn server_bind_address(&self) -> &str {
        &self.server_bind_address
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn serial_enabled(&self) -> bool {
        self.serial_enabled
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn classifier_enabled(&self) -> bool {
        self.classifier_enabled
    }

    pub fn classifier_url(&self) -> &str {
        &self.classifier_url
    }

    pub fn classifier_timeout_ms(&self) -> u64 {
        self.classifier_timeout_ms
    }

    pub fn shelves(&self) -> &BTreeMap<String, ShelfConfig> {
        &self.shelves
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to replace the shelf layout
    pub fn with_shelves(mut self, shelves: BTreeMap<String, ShelfConfig>) -> Self {
        self.shelves = shelves;
        self
    }

    /// Builder method to replace the numeric policy
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_port(), 5000);
        assert_eq!(config.policy().max_items, 20);
        assert_eq!(config.policy().low_stock_threshold, 5);
        assert_eq!(config.policy().theft_window_minutes, 10);
        assert_eq!(config.policy().alert_retention, 50);
        assert_eq!(config.policy().theft_retention, 20);
        assert!(!config.serial_enabled());
        assert!(!config.mqtt_enabled());
        assert!(!config.classifier_enabled());
    }

    #[test]
    fn test_default_shelves() {
        let config = Config::default();
        let shelves = config.shelves();
        assert_eq!(shelves.len(), 2);

        let d1 = &shelves["D1"];
        assert_eq!(d1.force_sensor, "F1");
        assert_eq!(d1.item_weight, 50);
        assert_eq!(d1.range(), 150);

        let d2 = &shelves["D2"];
        assert_eq!(d2.force_sensor, "F2");
        assert_eq!(d2.item_weight, 30);
    }

    #[test]
    fn test_policy_validation() {
        assert!(Policy::default().validate().is_ok());

        let policy = Policy { max_items: 0, ..Policy::default() };
        assert!(matches!(
            policy.validate(),
            Err(ConfigurationError::InvalidPolicy { ref field, .. }) if field == "max_items"
        ));

        let policy = Policy { alert_retention: 0, ..Policy::default() };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_theft_window_duration() {
        let policy = Policy { theft_window_minutes: 15, ..Policy::default() };
        assert_eq!(policy.theft_window(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_partial_policy_section_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str("[policy]\nmax_items = 30\n").unwrap();
        assert_eq!(toml_config.policy.max_items, 30);
        assert_eq!(toml_config.policy.low_stock_threshold, 5);
        assert!(toml_config.shelves.is_empty());
    }
}
