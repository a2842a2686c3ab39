//! Script backend
//!
//! Loads library scripts and a main script into one long-lived JavaScript
//! environment (boa_engine) and calls a named global function per batch.
//!
//! The engine context is not `Send`, and scripts are free to keep global
//! state between calls. The context therefore lives on a dedicated worker
//! thread and batches are queued to it over a channel: one call runs at a
//! time, in arrival order.
//!
//! # Calling convention
//!
//! ```javascript
//! function transform(input) {
//!     // `input` is the batch as JSON text, produced by JSON.stringify
//!     var records = JSON.parse(input);
//!     return records.map(function (r) { r.seen = true; return r; });
//!     // returning JSON.stringify(...) of the array works too
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use boa_engine::{Context, JsObject, JsValue, Source};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::ScriptConfig;
use crate::error::{Error, Result};
use crate::metrics::{ExecutionSample, MetricsSink, Outcome};
use crate::record::RecordBatch;
use crate::transformer::Transformer;

/// Batches waiting for the worker before `transform` callers start to wait.
const QUEUE_DEPTH: usize = 32;

/// A batch handed to the worker thread
struct Job {
    batch: RecordBatch,
    reply: oneshot::Sender<Result<RecordBatch>>,
}

/// Transformer backed by a function in an embedded JavaScript environment
pub struct ScriptTransformer {
    name: String,
    target: String,
    jobs: mpsc::Sender<Job>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for ScriptTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTransformer")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ScriptTransformer {
    /// Load the scripts and resolve the target function
    ///
    /// Blocks the calling thread until the worker has loaded every script.
    /// From async code, call it through `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// - a library or the main script cannot be read
    /// - a script fails to evaluate
    /// - the target is undefined or not a function
    pub fn new(
        name: impl Into<String>,
        config: &ScriptConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let name = name.into();
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(QUEUE_DEPTH);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);

        let worker_config = config.clone();
        let worker_name = name.clone();
        std::thread::Builder::new()
            .name(format!("recproc-script-{name}"))
            .spawn(move || {
                let mut environment = match ScriptEnvironment::load(&worker_config) {
                    Ok(environment) => {
                        let _ = ready_tx.send(Ok(()));
                        environment
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                environment.serve(&worker_name, jobs_rx);
            })?;

        ready_rx.recv().map_err(|_| Error::ConfigInvalid {
            message: "script worker exited during startup".to_string(),
        })??;

        info!(
            transformer = %name,
            target = %config.target,
            libraries = config.libraries.len(),
            main = %config.main.display(),
            "script environment ready"
        );

        Ok(Self {
            name,
            target: config.target.clone(),
            jobs: jobs_tx,
            metrics,
        })
    }

    /// Name of the function called per batch
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Queue a batch for the worker and wait for its answer.
    async fn submit(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.jobs
            .send(Job {
                batch,
                reply: reply_tx,
            })
            .await
            .map_err(|_| worker_gone())?;

        reply_rx.await.map_err(|_| worker_gone())?
    }
}

#[async_trait]
impl Transformer for ScriptTransformer {
    async fn transform(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let records = batch.len();
        let started = Instant::now();
        let result = self.submit(batch).await;
        let duration = started.elapsed();

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(e.kind()),
        };
        self.metrics.record_execution(&ExecutionSample {
            transformer: self.name.clone(),
            duration,
            records,
            outcome,
        });

        match &result {
            Ok(output) => debug!(
                transformer = %self.name,
                records_in = records,
                records_out = output.len(),
                elapsed_ms = duration.as_millis() as u64,
                "batch transformed"
            ),
            Err(e) => warn!(
                transformer = %self.name,
                records,
                error = %e,
                "batch transform failed"
            ),
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn worker_gone() -> Error {
    Error::Execution {
        message: "script environment is no longer running".to_string(),
        diagnostics: String::new(),
    }
}

/// The loaded engine, owned by the worker thread
struct ScriptEnvironment {
    context: Context,
    stringify: JsObject,
    function: JsObject,
    target: String,
}

impl ScriptEnvironment {
    fn load(config: &ScriptConfig) -> Result<Self> {
        let mut context = Context::default();

        if let Some(limit) = config.max_loop_iterations {
            context.runtime_limits_mut().set_loop_iteration_limit(limit);
        }

        // Taken before user code runs so scripts cannot swap it out.
        let stringify = context
            .eval(Source::from_bytes("JSON.stringify"))
            .ok()
            .and_then(|value| value.as_callable().cloned())
            .ok_or_else(|| Error::ConfigInvalid {
                message: "script engine does not provide JSON.stringify".to_string(),
            })?;

        for path in config.libraries.iter().chain(std::iter::once(&config.main)) {
            load_script(&mut context, path)?;
        }

        let function = resolve_target(&mut context, &config.target)?;

        Ok(Self {
            context,
            stringify,
            function,
            target: config.target.clone(),
        })
    }

    fn serve(&mut self, name: &str, mut jobs: mpsc::Receiver<Job>) {
        debug!(transformer = %name, "script worker started");

        while let Some(job) = jobs.blocking_recv() {
            // The caller dropped its future while the batch was queued.
            if job.reply.is_closed() {
                debug!(transformer = %name, "skipping batch abandoned by caller");
                continue;
            }

            let result = self.call(&job.batch);
            if job.reply.send(result).is_err() {
                debug!(transformer = %name, "caller went away before the result was ready");
            }
        }

        debug!(transformer = %name, "script worker finished (transformer dropped)");
    }

    fn call(&mut self, batch: &RecordBatch) -> Result<RecordBatch> {
        let input = self.encode(batch)?;

        let result = self
            .function
            .call(&JsValue::undefined(), &[input], &mut self.context)
            .map_err(|e| Error::Execution {
                message: format!("'{}' threw: {e}", self.target),
                diagnostics: String::new(),
            })?;

        self.adapt(result)
    }

    /// Batch to JSON text, serialized by the engine's own `JSON.stringify`.
    fn encode(&mut self, batch: &RecordBatch) -> Result<JsValue> {
        let value = serde_json::to_value(batch).map_err(|e| Error::Encode {
            message: e.to_string(),
        })?;
        let native = JsValue::from_json(&value, &mut self.context).map_err(|e| Error::Encode {
            message: e.to_string(),
        })?;
        self.stringify
            .call(&JsValue::undefined(), &[native], &mut self.context)
            .map_err(|e| Error::Encode {
                message: e.to_string(),
            })
    }

    /// Accept JSON text or a native array of objects.
    fn adapt(&mut self, result: JsValue) -> Result<RecordBatch> {
        if let Some(text) = result.as_string() {
            let text = text.to_std_string_escaped();
            return codec::decode(text.as_bytes()).map_err(|source| Error::Decode {
                source,
                diagnostics: String::new(),
            });
        }

        let is_array = result.as_object().is_some_and(|object| object.is_array());
        if !is_array {
            return Err(Error::ResultShape {
                found: describe(&result).to_string(),
            });
        }

        // Re-serialize with the engine's JSON.stringify so numbers come out
        // exactly as they would from a script returning JSON text.
        let text = self
            .stringify
            .call(&JsValue::undefined(), &[result], &mut self.context)
            .map_err(|e| Error::ResultShape {
                found: format!("an array that cannot be converted to JSON ({e})"),
            })?;
        let text = text
            .as_string()
            .map(|text| text.to_std_string_escaped())
            .ok_or_else(|| Error::ResultShape {
                found: "an array that cannot be converted to JSON".to_string(),
            })?;

        codec::decode(text.as_bytes()).map_err(|e| Error::ResultShape {
            found: format!("an array with a non-object element ({e})"),
        })
    }
}

fn load_script(context: &mut Context, path: &Path) -> Result<()> {
    let source = std::fs::read(path).map_err(|e| Error::ScriptLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    context
        .eval(Source::from_bytes(&source))
        .map_err(|e| Error::ScriptLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    debug!(path = %path.display(), bytes = source.len(), "loaded script");
    Ok(())
}

/// Look `target` up the way script code would see it.
///
/// Top-level `let` and `const` bindings live in the global scope but not on
/// the global object, so the name is evaluated as an expression instead of
/// read as a property. Only plain identifiers are accepted.
fn resolve_target(context: &mut Context, target: &str) -> Result<JsObject> {
    let unusable = |reason: String| Error::TargetNotCallable {
        target: target.to_string(),
        reason,
    };

    if !is_identifier(target) {
        return Err(unusable("is not a valid identifier".to_string()));
    }

    // `typeof` does not throw for undeclared names.
    let declared = context
        .eval(Source::from_bytes(&format!("typeof {target} !== 'undefined'")))
        .map_err(|e| unusable(format!("could not be resolved: {e}")))?;
    if !declared.to_boolean() {
        return Err(unusable("is not defined".to_string()));
    }

    let value = context
        .eval(Source::from_bytes(target))
        .map_err(|e| unusable(format!("could not be resolved: {e}")))?;

    value
        .as_callable()
        .cloned()
        .ok_or_else(|| unusable(format!("is {}, not a function", describe(&value))))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn describe(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_boolean() {
        "a boolean"
    } else if value.is_number() {
        "a number"
    } else if value.is_string() {
        "a string"
    } else if value.is_callable() {
        "a function"
    } else if value.is_object() {
        "a non-array object"
    } else {
        "an unsupported value"
    }
}
