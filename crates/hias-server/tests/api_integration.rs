//! HTTP API integration tests: exercise every route with a mock model and channel.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use hias_channels::{AgentTopic, MessagingChannel, MockChannel};
use hias_config::HiasConfig;
use hias_model::MockModel;

struct Setup {
    app: axum::Router,
    channel: Arc<MockChannel>,
}

async fn setup_with(config: HiasConfig, model: MockModel, connect: bool) -> Setup {
    let channel = Arc::new(MockChannel::new());
    if connect {
        channel.connect().await.unwrap();
    }
    let app = hias_server::build_router(Arc::new(config), Arc::new(model), channel.clone());
    Setup { app, channel }
}

async fn setup() -> Setup {
    setup_with(
        HiasConfig::default(),
        MockModel::new().with_prediction("ALL", 0.92).ready(),
        true,
    )
    .await
}

/// Helper to read the full body bytes from a response.
async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn inference_request(body: serde_json::Value) -> Request<Body> {
    Request::post("/Inference")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Health & Metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let s = setup().await;
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = s.app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model"], "xDNN");
    assert_eq!(json["ready"], true);
    assert_eq!(json["broker_connected"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let s = setup().await;
    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = s.app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.starts_with("text/plain"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("hias_classifications_total"));
}

// ── Inference ──────────────────────────────────────────────────

#[tokio::test]
async fn test_inference_returns_diagnosis_and_publishes() {
    let s = setup().await;
    let resp = s
        .app
        .oneshot(inference_request(serde_json::json!({"features": [0.1, 0.9]})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["Response"], "OK");
    assert_eq!(json["Diagnosis"], "ALL");
    assert!((json["Confidence"].as_f64().unwrap() - 0.92).abs() < 1e-6);
    assert!(json["Message"].as_str().unwrap().contains("ALL"));

    let published = s.channel.published.lock();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, AgentTopic::Sensors);
    assert_eq!(published[0].1["source"], "http");
}

#[tokio::test]
async fn test_inference_rejects_empty_features() {
    let s = setup().await;
    let resp = s
        .app
        .oneshot(inference_request(serde_json::json!({"features": []})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["Response"], "FAILED");
    assert!(s.channel.published.lock().is_empty());
}

#[tokio::test]
async fn test_inference_before_load_is_unavailable() {
    let s = setup_with(HiasConfig::default(), MockModel::new(), true).await;
    let resp = s
        .app
        .oneshot(inference_request(serde_json::json!({"features": [1.0]})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_inference_succeeds_when_broker_is_down() {
    let s = setup_with(
        HiasConfig::default(),
        MockModel::new().with_prediction("HEM", 0.5).ready(),
        false,
    )
    .await;
    let resp = s
        .app
        .oneshot(inference_request(serde_json::json!({"features": [1.0]})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["Diagnosis"], "HEM");
}

// ── Auth ───────────────────────────────────────────────────────

fn keyed_config() -> HiasConfig {
    let mut config = HiasConfig::default();
    config.server.api_key = Some("secret".into());
    config
}

#[tokio::test]
async fn test_inference_requires_api_key_when_configured() {
    let s = setup_with(keyed_config(), MockModel::new().ready(), true).await;
    let resp = s
        .app
        .oneshot(inference_request(serde_json::json!({"features": [1.0]})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inference_accepts_valid_api_key() {
    let s = setup_with(keyed_config(), MockModel::new().ready(), true).await;
    let req = Request::post("/Inference")
        .header("content-type", "application/json")
        .header("authorization", "Bearer secret")
        .body(Body::from(r#"{"features": [1.0]}"#))
        .unwrap();
    let resp = s.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_open_when_key_configured() {
    let s = setup_with(keyed_config(), MockModel::new(), false).await;
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = s.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
