//! MQTT ingest for shelf sensor readings
//!
//! Payloads are either a JSON object (`{"D1": 120, "F1": 500}`) or the
//! serial line format (`D1:120,F1:500`). Ingestion is synchronous on the
//! engine, so the event loop never waits on a channel.

use crate::domain::error::ValidationError;
use crate::domain::types::{parse_reading_line, readings_from_json, ReadingBatch};
use crate::infra::config::Config;
use crate::services::engine::ShelfEngine;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Decode a reading payload in either supported format
pub fn decode_payload(payload: &[u8]) -> Result<ReadingBatch, ValidationError> {
    let text = std::str::from_utf8(payload).map_err(|_| ValidationError::InvalidField {
        field: "payload".to_string(),
        reason: "not valid UTF-8".to_string(),
    })?;

    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| ValidationError::InvalidField {
                field: "payload".to_string(),
                reason: e.to_string(),
            })?;
        readings_from_json(&value)
    } else {
        parse_reading_line(trimmed)
    }
}

/// Subscribe to the readings topic and ingest until shutdown
pub async fn start_mqtt_ingest(
    config: &Config,
    engine: Arc<ShelfEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client_id = format!("shelf-sentinel-{}", config.site_id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.mqtt_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_ingest_subscribed"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match decode_payload(&publish.payload) {
                            Ok(batch) => {
                                let report = engine.ingest_batch(&batch);
                                debug!(
                                    topic = %publish.topic,
                                    accepted = %report.accepted,
                                    ignored = %report.ignored,
                                    "mqtt_readings"
                                );
                            }
                            Err(e) => {
                                engine.metrics().record_frame_rejected();
                                debug!(topic = %publish.topic, error = %e, "mqtt_payload_rejected");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscriptions do not survive a clean reconnect
                        if let Err(e) = client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await {
                            error!(error = %e, "mqtt_resubscribe_failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SensorReading;

    #[test]
    fn test_decode_json_payload() {
        let batch = decode_payload(br#"{"D1": 120, "F1": 500}"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.contains(&SensorReading::new("D1", 120)));
    }

    #[test]
    fn test_decode_line_payload() {
        let batch = decode_payload(b"D2:80,F2:300\n").unwrap();
        assert_eq!(batch[0], SensorReading::new("D2", 80));
        assert_eq!(batch[1], SensorReading::new("F2", 300));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payload(b"{\"D1\":").is_err());
        assert!(decode_payload(&[0xff, 0xfe]).is_err());
        assert!(decode_payload(b"D1=4").is_err());
    }
}
