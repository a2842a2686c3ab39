//! Process backend
//!
//! Runs one external executable per batch. The encoded batch is written to
//! the child's stdin and stdin is closed; stdout carries the result batch and
//! stderr is kept as diagnostic text for error messages.
//!
//! All three pipes are serviced concurrently with the wait, so a child that
//! writes a lot before reading its input cannot deadlock on a full pipe.
//! The deadline starts at launch. On unix the child leads its own process
//! group, so anything it forks can be signalled with it. When the deadline
//! expires the whole group is killed and the child is reaped before the
//! error is returned. When the caller drops the `transform` future instead,
//! the group is killed on drop and `kill_on_drop` takes care of the child.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::codec;
use crate::config::ProcessConfig;
use crate::error::{Error, Result};
use crate::metrics::{ExecutionSample, MetricsSink, Outcome};
use crate::record::RecordBatch;
use crate::transformer::Transformer;

/// stderr beyond this many bytes is drained but not kept.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// How a launched child ended
enum Execution {
    /// The child exited and all of its output was collected
    Completed {
        status: ExitStatus,
        stdout: Vec<u8>,
        diagnostics: String,
    },
    /// The deadline expired first
    TimedOut { diagnostics: String },
}

/// Transformer backed by an external executable
pub struct ProcessTransformer {
    name: String,
    config: ProcessConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for ProcessTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransformer")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProcessTransformer {
    /// Create a process transformer
    ///
    /// Nothing is launched here; the binary is only looked up when the
    /// first batch arrives.
    pub fn new(
        name: impl Into<String>,
        config: ProcessConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            metrics,
        }
    }

    /// Process configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.config.arguments())
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    async fn execute(&self, input: &[u8]) -> Result<RecordBatch> {
        let timeout = self.config.timeout();

        let mut child = self.command().spawn().map_err(|source| Error::Launch {
            command: self.config.command_line(),
            source,
        })?;

        let mut group = ProcessGroup::new(&child);

        debug!(
            transformer = %self.name,
            pid = child.id(),
            command = %self.config.command_line(),
            "process started"
        );

        match run_child(&mut child, input, timeout).await? {
            Execution::Completed {
                status,
                stdout,
                diagnostics,
            } => {
                group.release();

                debug!(
                    transformer = %self.name,
                    exit_code = status.code(),
                    stdout_bytes = stdout.len(),
                    "process exited"
                );

                if !status.success() {
                    return Err(Error::Execution {
                        message: format!("process exited with {status}"),
                        diagnostics,
                    });
                }

                codec::decode(&stdout).map_err(|source| Error::Decode {
                    source,
                    diagnostics,
                })
            }
            Execution::TimedOut { diagnostics } => {
                warn!(
                    transformer = %self.name,
                    pid = child.id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "process timed out; killing"
                );

                group.kill();
                // kill() also waits, so the child is reaped before we return.
                if let Err(e) = child.kill().await {
                    warn!(
                        transformer = %self.name,
                        error = %e,
                        "failed to kill timed out process"
                    );
                }

                Err(Error::Timeout {
                    timeout,
                    diagnostics,
                })
            }
        }
    }
}

#[async_trait]
impl Transformer for ProcessTransformer {
    async fn transform(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let input = codec::encode(&batch)?;

        let started = Instant::now();
        let result = self.execute(&input).await;
        let duration = started.elapsed();

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(e.kind()),
        };
        self.metrics.record_execution(&ExecutionSample {
            transformer: self.name.clone(),
            duration,
            records: batch.len(),
            outcome,
        });

        match &result {
            Ok(output) => debug!(
                transformer = %self.name,
                records_in = batch.len(),
                records_out = output.len(),
                elapsed_ms = duration.as_millis() as u64,
                "batch transformed"
            ),
            Err(e) => warn!(
                transformer = %self.name,
                records = batch.len(),
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

/// The child's process group, killed on drop unless released
///
/// Releasing happens once the child has exited normally; after that the
/// group id may belong to nobody.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }

    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // Safety: killpg only takes integers and touches no memory.
    let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if ret != 0 {
        debug!(pgid, error = %io::Error::last_os_error(), "could not signal process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Feed `input` to the child and collect its output under `timeout`.
async fn run_child(child: &mut Child, input: &[u8], timeout: Duration) -> Result<Execution> {
    let mut output = Vec::new();
    let mut diagnostics = Vec::new();

    let finished = tokio::time::timeout(
        timeout,
        exchange(child, input, &mut output, &mut diagnostics),
    )
    .await;

    let diagnostics = String::from_utf8_lossy(&diagnostics).into_owned();

    match finished {
        Ok(Ok(status)) => Ok(Execution::Completed {
            status,
            stdout: output,
            diagnostics,
        }),
        Ok(Err(e)) => Err(Error::Execution {
            message: format!("process I/O failed: {e}"),
            diagnostics,
        }),
        Err(_elapsed) => Ok(Execution::TimedOut { diagnostics }),
    }
}

/// Service all three pipes and wait for the child to exit.
async fn exchange(
    child: &mut Child,
    input: &[u8],
    output: &mut Vec<u8>,
    diagnostics: &mut Vec<u8>,
) -> io::Result<ExitStatus> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (written, read_out, read_err, status) = tokio::join!(
        write_input(stdin, input),
        drain(stdout, output),
        drain_diagnostics(stderr, diagnostics),
        child.wait(),
    );

    match written {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("process closed stdin before reading all input");
        }
        other => other?,
    }
    read_out?;
    read_err?;
    status
}

async fn write_input(stdin: Option<ChildStdin>, input: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    stdin.write_all(input).await?;
    // Dropping stdin on return closes the pipe; the child sees EOF.
    stdin.shutdown().await
}

async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, buf: &mut Vec<u8>) -> io::Result<()> {
    if let Some(mut stream) = stream {
        stream.read_to_end(buf).await?;
    }
    Ok(())
}

/// Read stderr to EOF, keeping at most [`MAX_DIAGNOSTIC_BYTES`].
///
/// Bytes land in `buf` as soon as they are read, so whatever arrived before
/// a timeout is still there when the future is dropped.
async fn drain_diagnostics<R: AsyncRead + Unpin>(
    stream: Option<R>,
    buf: &mut Vec<u8>,
) -> io::Result<()> {
    let Some(mut stream) = stream else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = MAX_DIAGNOSTIC_BYTES.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}
