//! Execution metrics sinks
//!
//! Each backend reports one [`ExecutionSample`] per batch it transforms.
//! What happens to the sample is up to the sink: [`TracingMetrics`] turns
//! it into a log event, [`NoopMetrics`] drops it.

use std::time::Duration;

use crate::error::ErrorKind;

/// Outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The batch was transformed
    Success,
    /// The execution failed at the given stage
    Failure(ErrorKind),
}

impl Outcome {
    /// Short label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(kind) => kind.as_str(),
        }
    }
}

/// Measurements for a single execution
#[derive(Debug, Clone)]
pub struct ExecutionSample {
    /// Transformer name
    pub transformer: String,
    /// Wall time from launch to outcome
    pub duration: Duration,
    /// Number of records sent
    pub records: usize,
    /// How the execution ended
    pub outcome: Outcome,
}

/// Destination for execution samples
pub trait MetricsSink: Send + Sync {
    /// Record one execution
    fn record_execution(&self, sample: &ExecutionSample);
}

/// Discards every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_execution(&self, _sample: &ExecutionSample) {}
}

/// Emits each sample as a `tracing` event under the `recproc::metrics` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record_execution(&self, sample: &ExecutionSample) {
        tracing::info!(
            target: "recproc::metrics",
            transformer = %sample.transformer,
            elapsed_ms = sample.duration.as_millis() as u64,
            records = sample.records,
            outcome = sample.outcome.as_str(),
            "execution finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Failure(ErrorKind::Timeout).as_str(), "timeout");
    }

    #[test]
    fn test_sinks_accept_samples() {
        let sample = ExecutionSample {
            transformer: "t".to_string(),
            duration: Duration::from_millis(5),
            records: 2,
            outcome: Outcome::Success,
        };
        NoopMetrics.record_execution(&sample);
        TracingMetrics.record_execution(&sample);
    }
}
