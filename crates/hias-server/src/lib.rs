//! # hias-server
//!
//! HTTP inference server started by the agent in `server` mode. Provides:
//!
//! - `POST /Inference`: classify one feature vector and publish the report
//! - `GET /health`: liveness plus model and broker state
//! - `GET /metrics`: Prometheus counters

pub mod metrics;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use hias_channels::{AgentTopic, MessagingChannel};
use hias_config::HiasConfig;
use hias_core::{
    ClassificationReport, HiasError, InferenceRequest, InferenceResponse, ReportSource, Result,
};
use hias_model::ModelFacade;
use hias_runtime::InferenceFrontend;

/// Shared server state. The model and channel are the coordinator's handles.
pub struct AppState {
    pub config: Arc<HiasConfig>,
    pub model: Arc<dyn ModelFacade>,
    pub channel: Arc<dyn MessagingChannel>,
    pub metrics: metrics::Metrics,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    ready: bool,
    broker_connected: bool,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Response")]
    response: &'static str,
    #[serde(rename = "Message")]
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            response: "FAILED",
            message: message.into(),
        }),
    )
}

/// Build the Axum router around the shared model and channel.
pub fn build_router(
    config: Arc<HiasConfig>,
    model: Arc<dyn ModelFacade>,
    channel: Arc<dyn MessagingChannel>,
) -> Router {
    let state = Arc::new(AppState {
        config: config.clone(),
        model,
        channel,
        metrics: metrics::Metrics::new(),
    });

    let inference = Router::new().route("/Inference", post(inference_handler));

    // Apply API key auth if configured
    let inference = if config.server.api_key.is_some() {
        inference.layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    } else {
        inference
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(inference)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if config.server.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Middleware that checks the Authorization header against the configured API key.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.config.server.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized inference request, invalid or missing API key");
                state.metrics.inc_http_errors();
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        model: state.model.kind().tag().into(),
        ready: state.model.is_ready(),
        broker_connected: state.channel.is_connected(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let body = state.metrics.render_prometheus();
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

async fn inference_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InferenceRequest>,
) -> std::result::Result<Json<InferenceResponse>, ApiError> {
    state.metrics.inc_http_requests();

    if req.features.is_empty() {
        state.metrics.inc_http_errors();
        return Err(api_error(StatusCode::BAD_REQUEST, "features must not be empty"));
    }

    let started = Instant::now();
    let prediction = state.model.classify(&req.features).map_err(|e| {
        state.metrics.inc_http_errors();
        let status = match e {
            HiasError::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            HiasError::Model(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %e, "inference failed");
        api_error(status, e.to_string())
    })?;
    state.metrics.record_classification(started.elapsed());
    info!(
        label = %prediction.label,
        confidence = prediction.confidence,
        "classified HTTP request"
    );

    let report = ClassificationReport::new(ReportSource::Http, state.model.kind().tag(), &prediction);
    match serde_json::to_value(&report) {
        Ok(payload) => {
            if let Err(e) = state.channel.publish(AgentTopic::Sensors, &payload).await {
                state.metrics.inc_report_failures();
                warn!(error = %e, "failed to publish classification report");
            }
        }
        Err(e) => {
            state.metrics.inc_report_failures();
            warn!(error = %e, "failed to encode classification report");
        }
    }

    Ok(Json(InferenceResponse::ok(&prediction)))
}

/// Serve the inference API until `shutdown` is cancelled.
pub async fn start_server(
    config: Arc<HiasConfig>,
    model: Arc<dyn ModelFacade>,
    channel: Arc<dyn MessagingChannel>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listen = config.server.listen.clone();
    let router = build_router(config, model, channel);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| HiasError::Server(format!("failed to bind {}: {}", listen, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| HiasError::Server(format!("server error: {}", e)))?;

    debug!("HTTP server stopped");
    Ok(())
}

/// The axum-backed inference frontend used by the coordinator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFrontend;

#[async_trait]
impl InferenceFrontend for HttpFrontend {
    async fn start(
        &self,
        config: Arc<HiasConfig>,
        model: Arc<dyn ModelFacade>,
        channel: Arc<dyn MessagingChannel>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        start_server(config, model, channel, shutdown).await
    }
}
