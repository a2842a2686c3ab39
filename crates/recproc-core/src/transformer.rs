//! The transformer capability and backend selection

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendConfig, TransformerConfig};
use crate::error::Result;
use crate::metrics::MetricsSink;
use crate::process::ProcessTransformer;
use crate::record::RecordBatch;
use crate::script::ScriptTransformer;

/// Something that turns one record batch into another
///
/// Implementations are safe to call concurrently. Dropping the returned
/// future cancels the call as far as the backend allows.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transform a batch
    async fn transform(&self, batch: RecordBatch) -> Result<RecordBatch>;

    /// Name used in logs and metrics
    fn name(&self) -> &str;
}

/// Build the transformer described by `config`
///
/// This is the only place that looks at the backend kind. Script backends
/// load and validate their scripts here, so a returned transformer is ready
/// to use.
///
/// Loading scripts blocks the calling thread until the engine is ready.
/// Async callers should run this through `tokio::task::spawn_blocking`.
pub fn build_transformer(
    config: &TransformerConfig,
    metrics: Arc<dyn MetricsSink>,
) -> Result<Arc<dyn Transformer>> {
    let transformer: Arc<dyn Transformer> = match &config.backend {
        BackendConfig::Process(process) => Arc::new(ProcessTransformer::new(
            config.name.clone(),
            process.clone(),
            metrics,
        )),
        BackendConfig::Script(script) => {
            Arc::new(ScriptTransformer::new(config.name.clone(), script, metrics)?)
        }
    };

    tracing::info!(
        transformer = %config.name,
        backend = config.backend.kind(),
        "transformer ready"
    );

    Ok(transformer)
}
