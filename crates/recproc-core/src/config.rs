//! Configuration parsing and validation
//!
//! A transformer is described by a single YAML document, `recproc.yaml` by
//! default. The `backend.type` field picks the implementation:
//!
//! ```yaml
//! name: enrich-orders
//! backend:
//!   type: process
//!   binary: ./bin/enrich
//!   command: "--mode strict"
//!   timeout_ms: 5000
//! ```
//!
//! ```yaml
//! backend:
//!   type: script
//!   libraries: [lib/util.js]
//!   main: main.js
//!   target: transform
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default file name looked up when a directory is given to [`TransformerConfig::load`]
pub const DEFAULT_CONFIG_FILE: &str = "recproc.yaml";

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Name used in logs and metrics
    #[serde(default = "default_name")]
    pub name: String,

    /// Backend selection and settings
    pub backend: BackendConfig,
}

fn default_name() -> String {
    "transformer".to_string()
}

/// Backend configuration, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Run an external executable per batch
    Process(ProcessConfig),

    /// Call a function inside an embedded JavaScript environment
    Script(ScriptConfig),
}

impl BackendConfig {
    /// Backend kind as written in the config file
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Process(_) => "process",
            Self::Script(_) => "script",
        }
    }
}

/// Process backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Executable to run
    pub binary: PathBuf,

    /// Sub-command appended to the binary, split on whitespace
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments passed verbatim after the sub-command words
    #[serde(default)]
    pub args: Vec<String>,

    /// Deadline for a single execution in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Working directory for the child process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Environment variables added to the child process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl ProcessConfig {
    /// Config for `binary` with default settings
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            command: None,
            args: Vec::new(),
            timeout_ms: default_timeout_ms(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Set the sub-command string
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Append verbatim arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the execution deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Execution deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Arguments in the order they are passed to the binary
    pub fn arguments(&self) -> Vec<String> {
        self.command
            .iter()
            .flat_map(|c| c.split_ascii_whitespace())
            .map(str::to_string)
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Human readable command line, for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary.display().to_string())
            .chain(self.arguments())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid {
                message: "process backend requires a non-empty 'binary'".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(Error::ConfigInvalid {
                message: "process backend 'timeout_ms' must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        // Bare names like `jq` are left for PATH lookup.
        if self.binary.is_relative() && self.binary.components().count() > 1 {
            self.binary = base.join(&self.binary);
        }
        if let Some(dir) = self.working_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// Script backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Library scripts, evaluated in order before `main`
    #[serde(default)]
    pub libraries: Vec<PathBuf>,

    /// Main script
    pub main: PathBuf,

    /// Name of the global function called for each batch
    pub target: String,

    /// Upper bound on loop iterations per evaluation
    #[serde(default)]
    pub max_loop_iterations: Option<u64>,
}

impl ScriptConfig {
    /// Config with no libraries
    pub fn new(main: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            libraries: Vec::new(),
            main: main.into(),
            target: target.into(),
            max_loop_iterations: None,
        }
    }

    /// Add a library script
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.libraries.push(path.into());
        self
    }

    /// Limit loop iterations
    pub fn with_max_loop_iterations(mut self, limit: u64) -> Self {
        self.max_loop_iterations = Some(limit);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.main.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid {
                message: "script backend requires a non-empty 'main'".to_string(),
            });
        }
        if self.target.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                message: "script backend requires a non-empty 'target'".to_string(),
            });
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for library in &mut self.libraries {
            if library.is_relative() {
                *library = base.join(&*library);
            }
        }
        if self.main.is_relative() {
            self.main = base.join(&self.main);
        }
    }
}

impl TransformerConfig {
    /// Load configuration from a file or a directory containing `recproc.yaml`
    ///
    /// Relative paths inside the document are resolved against the
    /// directory holding the config file.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = TransformerConfig::load("./transformers/enrich")?;
    /// println!("Backend: {}", config.backend.kind());
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(DEFAULT_CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.resolve_paths(&base_path);

        tracing::debug!(
            path = %config_path.display(),
            backend = config.backend.kind(),
            "loaded transformer configuration"
        );

        Ok(config)
    }

    /// Parse and validate a YAML document without touching the filesystem
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendConfig::Process(process) => process.validate(),
            BackendConfig::Script(script) => script.validate(),
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        match &mut self.backend {
            BackendConfig::Process(process) => process.resolve_paths(base),
            BackendConfig::Script(script) => script.resolve_paths(base),
        }
    }
}
