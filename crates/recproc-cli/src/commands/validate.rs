//! Validate configuration command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use recproc_core::{NoopMetrics, TransformerConfig, build_transformer};

/// Run the validate command
///
/// Script backends load their scripts and resolve the target here, so a
/// missing function is reported without running anything.
pub async fn run(config_path: &Path) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path.display());

    let config = TransformerConfig::load(config_path).context("Failed to load configuration")?;
    let backend = config.backend.kind();

    let transformer = tokio::task::spawn_blocking(move || {
        build_transformer(&config, Arc::new(NoopMetrics))
    })
    .await
    .context("Transformer construction panicked")?
    .context("Failed to construct transformer")?;

    tracing::info!("✓ Transformer: {}", transformer.name());
    tracing::info!("✓ Backend: {}", backend);
    tracing::info!("✓ Configuration is valid");
    Ok(())
}
