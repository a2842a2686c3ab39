//! recproc Core Library
//!
//! This crate runs record batches through pluggable external logic:
//! - Record batches and the JSON codec shared by every backend
//! - A process backend that pipes each batch through an executable
//! - A script backend that calls a JavaScript function in an embedded engine
//! - Configuration loading and backend selection
//!
//! # Architecture
//!
//! ```text
//!                          ┌──────────────────────┐
//!                     ┌───▶│  ProcessTransformer  │──▶ stdin / stdout / stderr
//! ┌─────────────┐     │    └──────────────────────┘
//! │ RecordBatch │─────┤
//! └─────────────┘     │    ┌──────────────────────┐
//!                     └───▶│  ScriptTransformer   │──▶ JS function on worker thread
//!                          └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recproc_core::{TransformerConfig, TracingMetrics, build_transformer};
//!
//! let config = TransformerConfig::load("./recproc.yaml")?;
//! let transformer = build_transformer(&config, Arc::new(TracingMetrics))?;
//! let output = transformer.transform(batch).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod process;
pub mod record;
pub mod script;
pub mod transformer;

pub use config::{BackendConfig, ProcessConfig, ScriptConfig, TransformerConfig};
pub use error::{Error, ErrorKind, Result};
pub use metrics::{ExecutionSample, MetricsSink, NoopMetrics, Outcome, TracingMetrics};
pub use process::ProcessTransformer;
pub use record::{Record, RecordBatch};
pub use script::ScriptTransformer;
pub use transformer::{Transformer, build_transformer};
