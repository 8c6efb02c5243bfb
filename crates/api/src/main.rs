//! Rice Disease Detection API - Main Entry Point

use anyhow::{anyhow, Context, Result};
use api::{init_logging, install_metrics, run_server, AppContext, Settings};
use fallback::load_models;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("invalid configuration")?;
    init_logging(&settings.logging).map_err(|e| anyhow!(e))?;

    info!("=== Rice Disease Detection API v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = install_metrics().context("cannot install metrics recorder")?;

    let paths = settings.model_paths();
    let seed = settings.models.fallback_seed;
    info!("Loading models from {}", settings.models.dir.display());
    let models = tokio::task::spawn_blocking(move || load_models(&paths, seed))
        .await
        .context("model loading task failed")?
        .context("cannot build placeholder models")?;

    info!("Image model: {}", models.engine.image_model_name());
    info!("Allowed CORS origins: {:?}", settings.allowed_origins());

    let ctx = Arc::new(AppContext::new(models, settings, Some(metrics)));
    run_server(ctx).await?;

    Ok(())
}
