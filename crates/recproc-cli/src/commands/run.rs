//! Transform a batch of records

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use recproc_core::{RecordBatch, TracingMetrics, TransformerConfig, build_transformer, codec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Run the transform command
pub async fn run(
    config_path: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    tracing::debug!("Loading configuration from {}", config_path.display());

    let config = TransformerConfig::load(config_path).context("Failed to load configuration")?;
    let transformer =
        tokio::task::spawn_blocking(move || build_transformer(&config, Arc::new(TracingMetrics)))
            .await
            .context("Transformer construction panicked")?
            .context("Failed to construct transformer")?;

    let batch = read_batch(input).await?;
    tracing::debug!(records = batch.len(), "read input batch");

    // Dropping the transform on Ctrl+C kills any running child
    let result = tokio::select! {
        result = transformer.transform(batch) => result,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    };
    let batch = result.with_context(|| format!("Transformer '{}' failed", transformer.name()))?;

    write_batch(&batch, output, pretty).await
}

async fn read_batch(input: Option<&Path>) -> Result<RecordBatch> {
    let bytes = match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };

    codec::decode(&bytes).context("Input is not a JSON array of objects")
}

async fn write_batch(batch: &RecordBatch, output: Option<&Path>, pretty: bool) -> Result<()> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(batch)?
    } else {
        codec::encode(batch)?
    };
    bytes.push(b'\n');

    match output {
        Some(path) => tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}
