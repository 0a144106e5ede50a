//! Service configuration.
//!
//! Built from three layers, later ones winning: compiled-in defaults, an
//! optional TOML file, and command-line overrides. The defaults reproduce
//! the stock deployment (lc0 on port 3002 with the ten-bucket table).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::error;

use crate::consts::{DEFAULT_BIND, DEFAULT_ENGINE_PROGRAM, DEFAULT_NN_CACHE_SIZE};
use crate::difficulty::BucketTable;
use crate::handoff::HandoffError;

/// What to do when a completion reaches the wrong request (or none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report the violation as a server error and keep serving.
    #[default]
    Respond,
    /// Log and abort the process.
    Abort,
}

impl FailurePolicy {
    /// Abort the process for invariant violations under [`FailurePolicy::Abort`].
    /// Returns normally otherwise.
    pub fn escalate(self, err: &HandoffError) {
        if self == FailurePolicy::Abort && err.is_violation() {
            error!(error = %err, "handoff invariant violated; aborting");
            std::process::abort();
        }
    }
}

/// How to launch and configure engine instances.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// UCI engine executable.
    pub program: PathBuf,
    /// Extra command-line arguments for the engine.
    pub args: Vec<String>,
    /// Directory model ids are resolved against. Model ids are passed as-is
    /// when unset.
    pub weights_dir: Option<PathBuf>,
    /// Neural-net cache entries per instance.
    pub cache_size: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ENGINE_PROGRAM),
            args: Vec::new(),
            weights_dir: None,
            cache_size: DEFAULT_NN_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub failure_policy: FailurePolicy,
    /// Create every model's engine before accepting requests.
    pub preload: bool,
    pub engine: EngineSettings,
    pub buckets: BucketTable,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            failure_policy: FailurePolicy::default(),
            preload: true,
            engine: EngineSettings::default(),
            buckets: BucketTable::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub engine_program: Option<PathBuf>,
    pub engine_args: Vec<String>,
    pub weights_dir: Option<PathBuf>,
    pub cache_size: Option<u32>,
    pub abort_on_violation: bool,
    pub no_preload: bool,
}

impl ServiceConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load `explicit` if given (it must exist), otherwise `fallback` if it
    /// exists, otherwise the defaults.
    pub fn discover(explicit: Option<&Path>, fallback: Option<&Path>) -> Result<Self> {
        match (explicit, fallback) {
            (Some(path), _) => Self::load(path),
            (None, Some(path)) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(program) = overrides.engine_program {
            self.engine.program = program;
        }
        if !overrides.engine_args.is_empty() {
            self.engine.args = overrides.engine_args;
        }
        if let Some(dir) = overrides.weights_dir {
            self.engine.weights_dir = Some(dir);
        }
        if let Some(size) = overrides.cache_size {
            self.engine.cache_size = size;
        }
        if overrides.abort_on_violation {
            self.failure_policy = FailurePolicy::Abort;
        }
        if overrides.no_preload {
            self.preload = false;
        }
    }
}
