//! Shelf simulator - scripted sensor readings and sales against a running server
//!
//! Scenarios:
//! - `depletion`: items leave the shelf one at a time, each with a matching sale
//! - `shoplift`: items leave the shelf with no sale recorded
//! - `unreplenished`: sales are recorded while the shelf stays full, so they
//!   age into potential thefts once the theft window passes
//!
//! Readings are posted to /upload_data, or published over MQTT with `--mqtt`.
//!
//! Usage:
//!   cargo run --bin shelf-sim -- --scenario depletion --shelf D1

use anyhow::{bail, Context};
use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shelf-sim", version, about = "Scripted shelf simulation for local testing")]
struct Args {
    /// Base URL of the shelf sentinel server
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    /// Scenario to run (depletion, shoplift, unreplenished)
    #[arg(short, long, default_value = "depletion")]
    scenario: String,

    /// Distance sensor id of the shelf to drive
    #[arg(long, default_value = "D1")]
    shelf: String,

    /// Items on the shelf when the scenario starts
    #[arg(long, default_value_t = 20)]
    start_items: u32,

    /// Capacity used to convert item counts into distances
    #[arg(long, default_value_t = 20)]
    max_items: u32,

    /// Delay between scenario steps in milliseconds
    #[arg(long, default_value_t = 1000)]
    step_ms: u64,

    /// Publish readings over MQTT instead of HTTP
    #[arg(long)]
    mqtt: bool,

    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,

    /// MQTT readings topic
    #[arg(long, default_value = "shelves/readings")]
    mqtt_topic: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ShelfCalibration {
    product_name: String,
    force_sensor: String,
    item_weight: u32,
    empty_distance: i64,
    full_distance: i64,
}

#[derive(Debug, Deserialize)]
struct ShelfConfigResponse {
    shelves: BTreeMap<String, ShelfCalibration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScenarioStep {
    /// Put the shelf at this item count
    SetItems(u32),
    /// Record a sale of this many items
    Sale(u32),
    /// Pause in addition to the step delay
    Wait(u64),
    /// Log the current shelf status
    Check,
}

#[derive(Debug)]
struct ScenarioRunner {
    name: String,
    steps: Vec<ScenarioStep>,
}

impl ScenarioRunner {
    fn depletion(start: u32) -> Self {
        let mut steps = vec![ScenarioStep::SetItems(start), ScenarioStep::Check];
        for n in (0..start).rev() {
            steps.push(ScenarioStep::SetItems(n));
            steps.push(ScenarioStep::Sale(1));
            steps.push(ScenarioStep::Check);
        }
        Self { name: "Depletion".to_string(), steps }
    }

    fn shoplift(start: u32) -> Self {
        let taken = start.min(5);
        let mut steps = vec![ScenarioStep::SetItems(start), ScenarioStep::Check];
        for i in 1..=taken {
            steps.push(ScenarioStep::SetItems(start - i));
            steps.push(ScenarioStep::Check);
        }
        Self { name: "Shoplift".to_string(), steps }
    }

    fn unreplenished(start: u32) -> Self {
        Self {
            name: "Unreplenished".to_string(),
            steps: vec![
                ScenarioStep::SetItems(start),
                ScenarioStep::Sale(2),
                ScenarioStep::Sale(1),
                ScenarioStep::Wait(500),
                ScenarioStep::Check,
            ],
        }
    }

    fn by_name(name: &str, start: u32) -> anyhow::Result<Self> {
        match name {
            "depletion" => Ok(Self::depletion(start)),
            "shoplift" => Ok(Self::shoplift(start)),
            "unreplenished" => Ok(Self::unreplenished(start)),
            other => bail!("unknown scenario '{other}' (expected depletion, shoplift or unreplenished)"),
        }
    }
}

/// Distance and weight readings a shelf holding `items` would report
fn readings_for(cal: &ShelfCalibration, items: u32, max_items: u32) -> (i64, i64) {
    let range = cal.empty_distance - cal.full_distance;
    let distance = cal.empty_distance - (items as i64 * range) / max_items.max(1) as i64;
    let weight = items as i64 * cal.item_weight as i64;
    (distance, weight)
}

enum ReadingSink {
    Http,
    Mqtt { client: AsyncClient, topic: String },
}

struct Simulator {
    http: reqwest::Client,
    base: String,
    sink: ReadingSink,
    shelf_id: String,
    cal: ShelfCalibration,
    max_items: u32,
}

impl Simulator {
    async fn post_json(&self, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            bail!("POST {path} returned {}: {value}", status.as_u16());
        }
        Ok(value)
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self.http.get(format!("{}{path}", self.base)).send().await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn set_items(&self, items: u32) -> anyhow::Result<()> {
        let (distance, weight) = readings_for(&self.cal, items, self.max_items);
        match &self.sink {
            ReadingSink::Http => {
                let mut body = serde_json::Map::new();
                body.insert(self.shelf_id.clone(), json!(distance));
                body.insert(self.cal.force_sensor.clone(), json!(weight));
                self.post_json("/upload_data", serde_json::Value::Object(body)).await?;
            }
            ReadingSink::Mqtt { client, topic } => {
                let line = format!("{}:{distance},{}:{weight}", self.shelf_id, self.cal.force_sensor);
                client.publish(topic.as_str(), QoS::AtLeastOnce, false, line).await?;
            }
        }
        info!(shelf = %self.shelf_id, items = %items, distance = %distance, weight = %weight, "readings_sent");
        Ok(())
    }

    async fn sale(&self, items: u32) -> anyhow::Result<()> {
        let resp = self
            .post_json(
                "/record_sale",
                json!({
                    "shelf_id": self.shelf_id,
                    "items_sold": items,
                    "product_name": self.cal.product_name,
                }),
            )
            .await?;
        info!(
            shelf = %self.shelf_id,
            items = %items,
            sale_id = %resp["sale"]["sale_id"],
            total_sales = %resp["total_sales"],
            "sale_sent"
        );
        Ok(())
    }

    async fn check(&self) -> anyhow::Result<()> {
        let status = self.get_json("/get_sensor_data").await?;
        let entry = &status["shelf_status"][self.shelf_id.as_str()];
        let thefts = self.get_json("/get_potential_thefts").await?;
        info!(
            shelf = %self.shelf_id,
            count = %entry["objects_count"],
            status = %entry["status"],
            thefts = %thefts["thefts"].as_array().map(|t| t.len()).unwrap_or(0),
            "shelf_checked"
        );
        Ok(())
    }

    async fn run(&self, scenario: &ScenarioRunner, step_delay: Duration) -> anyhow::Result<()> {
        info!(scenario = %scenario.name, steps = %scenario.steps.len(), "scenario_started");
        for (i, step) in scenario.steps.iter().enumerate() {
            let result = match step {
                ScenarioStep::SetItems(n) => self.set_items(*n).await,
                ScenarioStep::Sale(n) => self.sale(*n).await,
                ScenarioStep::Wait(ms) => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    Ok(())
                }
                ScenarioStep::Check => self.check().await,
            };
            if let Err(e) = result {
                warn!(step = %i, error = %e, "scenario_step_failed");
            }
            tokio::time::sleep(step_delay).await;
        }
        info!(scenario = %scenario.name, "scenario_complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let base = args.url.trim_end_matches('/').to_string();
    let scenario = ScenarioRunner::by_name(&args.scenario, args.start_items)?;

    let http = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;

    let resp = http.get(format!("{base}/get_shelf_config")).send().await.context("server unreachable")?;
    let config: ShelfConfigResponse = serde_json::from_slice(&resp.bytes().await?)?;
    let cal = config
        .shelves
        .get(&args.shelf)
        .cloned()
        .with_context(|| format!("shelf '{}' is not configured on the server", args.shelf))?;

    let sink = if args.mqtt {
        let mut opts = MqttOptions::new("shelf-sim", args.mqtt_host.as_str(), args.mqtt_port);
        opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(opts, 100);
        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    warn!(error = %e, "mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        ReadingSink::Mqtt { client, topic: args.mqtt_topic.clone() }
    } else {
        ReadingSink::Http
    };

    let sim = Simulator { http, base, sink, shelf_id: args.shelf, cal, max_items: args.max_items };
    sim.run(&scenario, Duration::from_millis(args.step_ms)).await
}
