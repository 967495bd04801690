//! JSON HTTP API over the shelf engine
//!
//! Plain hyper 1 http1 server, one task per connection, stopped through the
//! shared shutdown watch. Every response carries
//! `Access-Control-Allow-Origin: *` so the dashboard can call it from a
//! browser.

use crate::domain::error::{ClassifierError, ValidationError};
use crate::domain::sale::SaleInput;
use crate::domain::types::readings_from_json;
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::classifier::{fetch_image, MisplacementClassifier};
use crate::services::engine::ShelfEngine;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Largest request body accepted, image payloads included
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state handed to every connection
pub struct ApiState {
    pub engine: Arc<ShelfEngine>,
    pub classifier: Arc<dyn MisplacementClassifier>,
    /// Used to download images referenced by `image_url`; carries a timeout
    pub http_client: reqwest::Client,
    pub site_id: String,
}

impl ApiState {
    pub fn new(
        engine: Arc<ShelfEngine>,
        classifier: Arc<dyn MisplacementClassifier>,
        site_id: &str,
        fetch_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .context("Failed to build image fetch client")?;
        Ok(Self { engine, classifier, http_client, site_id: site_id.to_string() })
    }
}

#[derive(Debug, Default, Deserialize)]
struct CheckMisplacementBody {
    #[serde(default)]
    shelf_id: Option<String>,
    #[serde(default)]
    expected_product: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    /// Inline alternative to `image_url`
    #[serde(default)]
    image_base64: Option<String>,
}

type ApiResponse = Response<Full<Bytes>>;

fn cors(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder.header("Access-Control-Allow-Origin", "*")
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> ApiResponse {
    match serde_json::to_vec(value) {
        Ok(body) => cors(Response::builder())
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .expect("static response should not fail"),
        Err(e) => {
            error!(error = %e, "response_encode_error");
            cors(Response::builder())
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(r#"{"error":"response encoding failed"}"#)))
                .expect("static response should not fail")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    json_response(status, &json!({ "error": message }))
}

fn validation_response(err: &ValidationError) -> ApiResponse {
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

/// Collect a body up to `MAX_BODY_BYTES`
async fn read_body<B>(body: B) -> Result<Bytes, ApiResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
        }
        Err(e) => {
            warn!(error = %e, "request_body_error");
            Err(error_response(StatusCode::BAD_REQUEST, "failed to read request body"))
        }
    }
}

/// Parse a JSON body, treating an empty one as missing
fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(error_response(StatusCode::BAD_REQUEST, "No data received"));
    }
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")))
}

/// Dispatch one request
pub async fn route<B>(req: Request<B>, state: &ApiState) -> ApiResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let engine = &state.engine;

    match (method, path.as_str()) {
        (Method::GET, "/test") => json_response(
            StatusCode::OK,
            &json!({ "status": "ok", "message": "Server is running" }),
        ),
        (Method::GET, "/health") => cors(Response::builder())
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail"),
        (Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(engine, &state.site_id);
            cors(Response::builder())
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        (Method::POST, "/upload_data") => {
            let body = match read_body(req.into_body()).await {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            let value: serde_json::Value = match parse_json(&body) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let readings = match readings_from_json(&value) {
                Ok(r) => r,
                Err(e) => {
                    engine.metrics().record_frame_rejected();
                    return validation_response(&e);
                }
            };
            let report = engine.ingest_batch(&readings);
            debug!(accepted = %report.accepted, ignored = %report.ignored, "sensor_data_uploaded");
            json_response(
                StatusCode::OK,
                &json!({
                    "message": "Sensor data updated successfully",
                    "sensor_data": engine.sensor_snapshot(),
                    "accepted": report.accepted,
                    "ignored": report.ignored,
                }),
            )
        }
        (Method::POST, "/record_sale") => {
            let body = match read_body(req.into_body()).await {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            let input: SaleInput = match parse_json(&body) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            match engine.record_sale(input) {
                Ok(receipt) => json_response(
                    StatusCode::OK,
                    &json!({
                        "message": "Sale recorded successfully",
                        "sale": receipt.sale,
                        "total_sales": receipt.total_sale_count,
                    }),
                ),
                Err(e) => validation_response(&e),
            }
        }
        (Method::GET, "/get_sales_data") => json_response(StatusCode::OK, &engine.sales_summary()),
        (Method::GET, "/get_sensor_data") => json_response(
            StatusCode::OK,
            &json!({
                "shelf_status": engine.get_shelf_status(),
                "timestamp": Utc::now(),
            }),
        ),
        (Method::GET, "/get_potential_thefts") => json_response(
            StatusCode::OK,
            &json!({
                "thefts": engine.get_potential_thefts(),
                "timestamp": Utc::now(),
            }),
        ),
        (Method::GET, "/get_alerts") => json_response(StatusCode::OK, &engine.get_alerts()),
        (Method::GET, "/get_shelf_config") => {
            json_response(StatusCode::OK, &json!({ "shelves": engine.get_shelf_config() }))
        }
        (Method::POST, "/check_misplacement") => {
            let body = match read_body(req.into_body()).await {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            let body: CheckMisplacementBody = match parse_json(&body) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            check_misplacement(body, state).await
        }
        (Method::OPTIONS, _) => cors(Response::builder())
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn check_misplacement(body: CheckMisplacementBody, state: &ApiState) -> ApiResponse {
    let mut missing = Vec::new();
    if body.shelf_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
        missing.push("shelf_id".to_string());
    }
    if body.image_url.is_none() && body.image_base64.is_none() {
        missing.push("image_url".to_string());
    }
    if !missing.is_empty() {
        return validation_response(&ValidationError::MissingFields(missing));
    }
    let shelf_id = body.shelf_id.unwrap_or_default();

    let image = match (body.image_base64, body.image_url) {
        (Some(encoded), _) => match STANDARD.decode(encoded.trim()) {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                return validation_response(&ValidationError::InvalidField {
                    field: "image_base64".to_string(),
                    reason: e.to_string(),
                })
            }
        },
        (None, Some(url)) => match fetch_image(&state.http_client, &url, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "image_fetch_failed");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({ "error": "Failed to fetch image", "details": e.to_string() }),
                );
            }
        },
        (None, None) => Bytes::new(),
    };

    let request = match state.engine.misplacement_request(
        &shelf_id,
        body.expected_product.as_deref(),
        image,
    ) {
        Ok(r) => r,
        Err(e) => return validation_response(&e),
    };

    let result = state.classifier.classify(&request).await;
    state.engine.metrics().record_classifier_request(result.is_ok());

    match result {
        Ok(verdict) => json_response(StatusCode::OK, &verdict),
        Err(ClassifierError::Unavailable) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Classifier not configured")
        }
        Err(e) => json_response(
            StatusCode::BAD_GATEWAY,
            &json!({ "error": "Failed to check misplacement", "details": e.to_string() }),
        ),
    }
}

/// Serve connections from an already-bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move {
                                    let start = Instant::now();
                                    let response = route(req, &state).await;
                                    state.engine.metrics().record_request(start.elapsed().as_micros() as u64);
                                    Ok::<_, Infallible>(response)
                                }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and run the API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    state: Arc<ApiState>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = format!("{bind_address}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {addr}"))?;

    info!(addr = %addr, site = %state.site_id, "api_server_started");
    serve(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::{MisplacementRequest, MisplacementResult};
    use crate::domain::types::Confidence;
    use crate::infra::config::Config;
    use crate::infra::metrics::Metrics;
    use crate::services::classifier::DisabledClassifier;
    use async_trait::async_trait;

    /// Reports a shelf as misplaced when the image bytes are "wrong"
    struct FakeClassifier;

    #[async_trait]
    impl MisplacementClassifier for FakeClassifier {
        async fn classify(
            &self,
            request: &MisplacementRequest,
        ) -> Result<MisplacementResult, ClassifierError> {
            let misplaced = request.image.as_ref() == b"wrong";
            Ok(MisplacementResult {
                misplaced,
                detected_product: if misplaced { "Other".to_string() } else { request.expected_product.clone() },
                confidence: Confidence::Medium,
                details: format!("checked {}", request.shelf_id),
            })
        }
    }

    fn state_with(classifier: Arc<dyn MisplacementClassifier>) -> ApiState {
        let engine = ShelfEngine::from_config(&Config::default(), Arc::new(Metrics::new())).unwrap();
        ApiState::new(Arc::new(engine), classifier, "test-site", Duration::from_millis(300)).unwrap()
    }

    fn state() -> ApiState {
        state_with(Arc::new(DisabledClassifier))
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder().method(Method::GET).uri(path).body(Full::new(Bytes::new())).unwrap()
    }

    fn post(path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn json_of(resp: ApiResponse) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_test_endpoint() {
        let resp = route(get("/test"), &state()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
        let body = json_of(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_then_sensor_data() {
        let state = state();
        let resp = route(post("/upload_data", r#"{"D1":125,"F1":250,"X":1}"#), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_of(resp).await;
        assert_eq!(body["accepted"], 2);
        assert_eq!(body["ignored"], 1);
        assert_eq!(body["sensor_data"]["D1"], 125);
        assert!(body["sensor_data"].get("X").is_none());

        let body = json_of(route(get("/get_sensor_data"), &state).await).await;
        assert_eq!(body["shelf_status"]["D1"]["objects_count"], 7);
        assert_eq!(body["shelf_status"]["D1"]["status"], "normal");
        assert_eq!(body["shelf_status"]["F1"]["weight"], 250);
        assert_eq!(body["shelf_status"]["D2"]["status"], "empty");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_integer() {
        let state = state();
        let resp = route(post("/upload_data", r#"{"D1":"tall"}"#), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.engine.read_sensor("D1"), 0);
    }

    #[tokio::test]
    async fn test_record_sale_and_sales_data() {
        let state = state();
        let resp = route(post("/record_sale", r#"{"shelf_id":"D1","items_sold":2,"sale_id":"S1"}"#), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_of(resp).await;
        assert_eq!(body["total_sales"], 1);
        assert_eq!(body["sale"]["product_name"], "Product 1");

        let body = json_of(route(get("/get_sales_data"), &state).await).await;
        assert_eq!(body["total_sales"], 1);
        assert_eq!(body["hourly_rate"], 1);
        assert_eq!(body["sales"][0]["sale_id"], "S1");
    }

    #[tokio::test]
    async fn test_record_sale_validation_errors() {
        let state = state();
        let resp = route(post("/record_sale", r#"{"shelf_id":"D1"}"#), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_of(resp).await;
        assert!(body["error"].as_str().unwrap().contains("items_sold"));

        let resp = route(post("/record_sale", ""), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = route(post("/record_sale", "{not json"), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.engine.pending_sales(), 0);
    }

    #[tokio::test]
    async fn test_thefts_alerts_and_config() {
        let state = state();
        let body = json_of(route(get("/get_potential_thefts"), &state).await).await;
        assert_eq!(body["thefts"].as_array().unwrap().len(), 0);

        route(get("/get_sensor_data"), &state).await;
        let body = json_of(route(get("/get_alerts"), &state).await).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["type"], "stock");

        let body = json_of(route(get("/get_shelf_config"), &state).await).await;
        assert_eq!(body["shelves"]["D1"]["force_sensor"], "F1");
    }

    #[tokio::test]
    async fn test_check_misplacement() {
        let state = state_with(Arc::new(FakeClassifier));
        let ok = STANDARD.encode(b"fine");
        let body = format!(r#"{{"shelf_id":"D1","image_base64":"{ok}"}}"#);
        let resp = route(post("/check_misplacement", &body), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_of(resp).await;
        assert_eq!(body["misplaced"], false);
        assert_eq!(body["detected_product"], "Product 1");

        let wrong = STANDARD.encode(b"wrong");
        let body = format!(r#"{{"shelf_id":"D2","expected_product":"Cola","image_base64":"{wrong}"}}"#);
        let body = json_of(route(post("/check_misplacement", &body), &state).await).await;
        assert_eq!(body["misplaced"], true);
        assert_eq!(state.engine.metrics().classifier_requests(), 2);
    }

    #[tokio::test]
    async fn test_check_misplacement_errors() {
        let state = state();
        let resp = route(post("/check_misplacement", r#"{"shelf_id":"D1"}"#), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let img = STANDARD.encode(b"x");
        let body = format!(r#"{{"shelf_id":"D1","image_base64":"{img}"}}"#);
        let resp = route(post("/check_misplacement", &body), &state).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.engine.metrics().classifier_failures(), 1);
    }

    #[tokio::test]
    async fn test_check_misplacement_stalled_image_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let state = state_with(Arc::new(FakeClassifier));
        let body = format!(r#"{{"shelf_id":"D1","image_url":"http://{addr}/shelf.jpg"}}"#);
        let resp = tokio::time::timeout(
            Duration::from_secs(5),
            route(post("/check_misplacement", &body), &state),
        )
        .await
        .expect("image fetch should time out");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(resp).await["error"], "Failed to fetch image");
        assert_eq!(state.engine.metrics().classifier_requests(), 0);
    }

    #[tokio::test]
    async fn test_preflight_and_not_found() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/record_sale")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = route(req, &state()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));

        let resp = route(get("/nope"), &state()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let big = "x".repeat(MAX_BODY_BYTES + 1);
        let resp = route(post("/record_sale", &big), &state()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_served_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(state());
        let server = tokio::spawn(serve(listener, state.clone(), shutdown_rx));

        let resp = reqwest::Client::new().get(format!("http://{addr}/test")).send().await.unwrap();
        assert!(resp.status().is_success());
        assert_eq!(state.engine.metrics().http_requests(), 1);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
