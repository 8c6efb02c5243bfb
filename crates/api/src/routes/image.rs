//! Leaf image classification

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use inference_engine::{ImagePrediction, NUM_LEAF_CLASSES};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{record_request, run_inference};
use crate::error::ApiError;
use crate::AppContext;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

const ENDPOINT: &str = "predict_image";

#[derive(Debug, Serialize)]
pub struct ImagePredictionResponse {
    pub message: String,
    pub probabilities: [f32; NUM_LEAF_CLASSES],
}

pub async fn predict_image(
    State(ctx): State<Arc<AppContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match classify_upload(&ctx, multipart).await {
        Ok(prediction) => {
            record_request(ENDPOINT, "ok");
            info!(
                label = prediction.label.as_str(),
                confidence = prediction.confidence,
                "Image prediction"
            );
            Json(ImagePredictionResponse {
                message: prediction.message(),
                probabilities: prediction.probabilities,
            })
            .into_response()
        }
        Err(e) => {
            record_request(ENDPOINT, e.kind().as_str());
            warn!("Image prediction failed: {}", e);
            e.into_response_with(ctx.settings.server.strict_status_codes)
        }
    }
}

async fn classify_upload(
    ctx: &Arc<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ImagePrediction, ApiError> {
    let bytes = read_file_field(multipart?).await?;
    run_inference(ctx, "cnn", move |engine| engine.predict_image(&bytes)).await
}

/// Bytes of the first `file` field; other fields are skipped
async fn read_file_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Upload(e.to_string()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return field.bytes().await.map_err(|e| ApiError::Upload(e.to_string()));
        }
    }
    Err(ApiError::missing_field(FILE_FIELD))
}
