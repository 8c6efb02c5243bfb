//! Rice Disease Detection API Server
//!
//! HTTP front end for the leaf image classifier and the environmental
//! condition classifier.

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use fallback::{LoadedModels, ModelStatus};
use inference_engine::InferenceEngine;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod error;
mod routes;
pub mod settings;

pub use error::{ApiError, ErrorKind};
pub use settings::{LogFormat, LoggingConfig, Settings};

/// Shared, read-only state built once at startup
pub struct AppContext {
    pub engine: InferenceEngine,
    /// How each model slot was populated
    pub status: ModelStatus,
    pub settings: Settings,
    /// Absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
}

impl AppContext {
    pub fn new(models: LoadedModels, settings: Settings, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            engine: models.engine,
            status: models.status,
            settings,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Create the application router
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.settings);
    let body_limit = DefaultBodyLimit::max(ctx.settings.server.max_upload_bytes);

    Router::new()
        .route("/", get(routes::status::root))
        .route("/health", get(routes::status::health))
        .route("/metrics", get(routes::status::metrics))
        .route("/predict-image/", post(routes::image::predict_image))
        .route("/predict-image", post(routes::image::predict_image))
        .route("/predict-tabular/", post(routes::tabular::predict_tabular))
        .route("/predict-tabular", post(routes::tabular::predict_tabular))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// Credentials are allowed, so "any origin" mirrors the caller's origin
/// instead of answering `*`
pub fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings.allowed_origins();

    let allow_origin = if settings.cors.allow_any_origin || origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
}

/// Install the global Prometheus recorder and describe the service metrics
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "rice_api_requests_total",
        "Prediction requests by endpoint and outcome"
    );
    metrics::describe_histogram!(
        "rice_api_inference_seconds",
        metrics::Unit::Seconds,
        "Model inference latency"
    );

    Ok(handle)
}

/// Serve until Ctrl-C
pub async fn run_server(ctx: Arc<AppContext>) -> Result<(), std::io::Error> {
    let addr = ctx.settings.bind_address();
    let app = create_router(ctx);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Cannot listen for shutdown signal: {}", e),
    }
}
