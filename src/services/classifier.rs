//! Misplacement classification collaborator
//!
//! The engine never looks at image content. It builds a
//! `MisplacementRequest` and hands it to whatever implements
//! `MisplacementClassifier`; the verdict is passed back untouched.

use crate::domain::alert::{MisplacementRequest, MisplacementResult};
use crate::domain::error::ClassifierError;
use crate::infra::config::Config;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[async_trait]
pub trait MisplacementClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &MisplacementRequest,
    ) -> Result<MisplacementResult, ClassifierError>;
}

/// Stand-in when no classifier is configured
pub struct DisabledClassifier;

#[async_trait]
impl MisplacementClassifier for DisabledClassifier {
    async fn classify(
        &self,
        _request: &MisplacementRequest,
    ) -> Result<MisplacementResult, ClassifierError> {
        Err(ClassifierError::Unavailable)
    }
}

#[derive(Serialize)]
struct ClassifyBody<'a> {
    shelf_id: &'a str,
    expected_product: &'a str,
    image_base64: String,
}

/// Posts the image to an external classification service as JSON
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        // One client for connection pooling across requests
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.to_string() })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClassifierError> {
        Self::new(config.classifier_url(), Duration::from_millis(config.classifier_timeout_ms()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MisplacementClassifier for HttpClassifier {
    async fn classify(
        &self,
        request: &MisplacementRequest,
    ) -> Result<MisplacementResult, ClassifierError> {
        let start = Instant::now();
        let body = serde_json::to_vec(&ClassifyBody {
            shelf_id: &request.shelf_id,
            expected_product: &request.expected_product,
            image_base64: STANDARD.encode(&request.image),
        })?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(shelf_id = %request.shelf_id, error = %e, "classifier_request_error");
                ClassifierError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(shelf_id = %request.shelf_id, status = %status.as_u16(), "classifier_bad_status");
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| ClassifierError::Transport(e.to_string()))?;
        let result: MisplacementResult = serde_json::from_slice(&bytes)?;

        info!(
            shelf_id = %request.shelf_id,
            misplaced = %result.misplaced,
            detected = %result.detected_product,
            latency_ms = %start.elapsed().as_millis(),
            "classifier_result"
        );
        Ok(result)
    }
}

/// Download an image referenced by URL, refusing anything over `max_bytes`
///
/// The request is bounded by the client's own timeout.
pub async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<Bytes, ClassifierError> {
    let mut response =
        client.get(url).send().await.map_err(|e| ClassifierError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClassifierError::Status(status.as_u16()));
    }

    if response.content_length().is_some_and(|len| len > max_bytes as u64) {
        return Err(ClassifierError::TooLarge { limit: max_bytes });
    }

    // Content-Length may be absent or wrong, so the limit also applies per chunk
    let mut image = BytesMut::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|e| ClassifierError::Transport(e.to_string()))?
    {
        if image.len() + chunk.len() > max_bytes {
            return Err(ClassifierError::TooLarge { limit: max_bytes });
        }
        image.extend_from_slice(&chunk);
    }
    Ok(image.freeze())
}
