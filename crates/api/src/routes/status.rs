//! Liveness, model health and metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use fallback::ModelStatus;
use serde::Serialize;
use std::sync::Arc;

use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: String,
}

/// One flag per model slot
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlotFlags {
    pub cnn_model: bool,
    pub rf_model: bool,
    pub scaler: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_loaded: SlotFlags,
    /// Slots served by a placeholder
    pub fallback: SlotFlags,
}

impl HealthResponse {
    pub fn from_status(status: &ModelStatus) -> Self {
        Self {
            status: "healthy",
            models_loaded: SlotFlags {
                cnn_model: status.cnn_model.loaded,
                rf_model: status.rf_model.loaded,
                scaler: status.scaler.loaded,
            },
            fallback: SlotFlags {
                cnn_model: status.cnn_model.fallback,
                rf_model: status.rf_model.fallback,
                scaler: status.scaler.fallback,
            },
        }
    }
}

pub async fn root(State(ctx): State<Arc<AppContext>>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "healthy",
        message: "Rice Disease Detection API is running",
        version: ctx.version.clone(),
    })
}

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse::from_status(&ctx.status))
}

/// Prometheus text exposition
pub async fn metrics(State(ctx): State<Arc<AppContext>>) -> Response {
    match &ctx.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
