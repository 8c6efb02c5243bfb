//! Route handlers

pub mod image;
pub mod status;
pub mod tabular;

use crate::error::ApiError;
use crate::AppContext;
use inference_engine::{InferenceEngine, InferenceError};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// Run a model call on the blocking pool and record its latency
pub(crate) async fn run_inference<T, F>(
    ctx: &Arc<AppContext>,
    model: &'static str,
    f: F,
) -> Result<T, ApiError>
where
    F: FnOnce(&InferenceEngine) -> Result<T, InferenceError> + Send + 'static,
    T: Send + 'static,
{
    let ctx = Arc::clone(ctx);
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || f(&ctx.engine))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?;

    histogram!("rice_api_inference_seconds", "model" => model)
        .record(started.elapsed().as_secs_f64());

    Ok(result?)
}

pub(crate) fn record_request(endpoint: &'static str, outcome: &'static str) {
    counter!("rice_api_requests_total", "endpoint" => endpoint, "outcome" => outcome).increment(1);
}
