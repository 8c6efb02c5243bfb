//! Environmental condition classification

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use inference_engine::EnvironmentPrediction;
use preprocessing::EnvironmentalReading;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{record_request, run_inference};
use crate::error::ApiError;
use crate::AppContext;

const ENDPOINT: &str = "predict_tabular";

#[derive(Debug, Serialize)]
pub struct TabularPredictionResponse {
    pub message: &'static str,
    pub condition: &'static str,
}

pub async fn predict_tabular(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<EnvironmentalReading>, JsonRejection>,
) -> Response {
    match classify_reading(&ctx, payload).await {
        Ok(prediction) => {
            record_request(ENDPOINT, "ok");
            info!(
                condition = prediction.condition.as_str(),
                confidence = prediction.confidence,
                "Environment prediction"
            );
            Json(TabularPredictionResponse {
                message: prediction.message(),
                condition: prediction.condition.as_str(),
            })
            .into_response()
        }
        Err(e) => {
            record_request(ENDPOINT, e.kind().as_str());
            warn!("Environment prediction failed: {}", e);
            e.into_response_with(ctx.settings.server.strict_status_codes)
        }
    }
}

async fn classify_reading(
    ctx: &Arc<AppContext>,
    payload: Result<Json<EnvironmentalReading>, JsonRejection>,
) -> Result<EnvironmentPrediction, ApiError> {
    let Json(reading) = payload?;
    run_inference(ctx, "random_forest", move |engine| engine.predict_environment(&reading)).await
}
