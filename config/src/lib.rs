//! Configuration loading for Tether.
//!
//! The only things configurable at this layer are which execution strategy
//! the application is assembled with and that strategy's knobs:
//!
//! ```toml
//! [execution]
//! strategy = "in_process"     # or "delegated"
//! on_timeout = "signal"       # or "abort"
//! max_concurrency = 16
//! default_timeout_ms = 30000
//! ```
//!
//! Decorator chains are assembled in code by the application.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use tether_exec::{DelegatedStrategy, ExecutionContext, InProcessStrategy, Strategy};
use tether_types::{CancelMode, InteractionId};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "TETHER_CONFIG";

/// Timeout used by [`ExecutionConfig::context`] when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    InProcess,
    Delegated,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionConfigError {
    #[error("default_timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("max_concurrency must be greater than zero")]
    ZeroConcurrency,
}

#[derive(Deserialize)]
struct RawExecutionConfig {
    #[serde(default)]
    strategy: StrategyKind,
    #[serde(default)]
    on_timeout: CancelMode,
    max_concurrency: Option<usize>,
    default_timeout_ms: Option<u64>,
}

/// Validated `[execution]` table.
///
/// Invariant: the default timeout and the concurrency limit (when present)
/// are non-zero, enforced at the deserialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawExecutionConfig")]
pub struct ExecutionConfig {
    strategy: StrategyKind,
    on_timeout: CancelMode,
    max_concurrency: Option<NonZeroUsize>,
    default_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            on_timeout: CancelMode::default(),
            max_concurrency: None,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TryFrom<RawExecutionConfig> for ExecutionConfig {
    type Error = ExecutionConfigError;

    fn try_from(raw: RawExecutionConfig) -> Result<Self, Self::Error> {
        let default_timeout = match raw.default_timeout_ms {
            Some(0) => return Err(ExecutionConfigError::ZeroTimeout),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_TIMEOUT,
        };
        let max_concurrency = match raw.max_concurrency {
            Some(n) => Some(NonZeroUsize::new(n).ok_or(ExecutionConfigError::ZeroConcurrency)?),
            None => None,
        };
        Ok(Self {
            strategy: raw.strategy,
            on_timeout: raw.on_timeout,
            max_concurrency,
            default_timeout,
        })
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy
    }

    #[must_use]
    pub fn on_timeout(&self) -> CancelMode {
        self.on_timeout
    }

    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency.map(NonZeroUsize::get)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Assemble the configured strategy.
    ///
    /// Each call creates an independent concurrency limit, so build once and
    /// share the result (it is cheap to clone and clones share the limit).
    #[must_use]
    pub fn build_strategy(&self) -> Strategy {
        match self.strategy {
            StrategyKind::InProcess => {
                let mut strategy = InProcessStrategy::new().with_cancel_mode(self.on_timeout);
                if let Some(permits) = self.max_concurrency {
                    strategy = strategy.with_max_concurrency(permits.get());
                }
                Strategy::InProcess(strategy)
            }
            StrategyKind::Delegated => Strategy::Delegated(DelegatedStrategy::new()),
        }
    }

    /// First-attempt context using the configured default timeout.
    pub fn context(&self, interaction_id: impl Into<InteractionId>) -> ExecutionContext {
        ExecutionContext::new(interaction_id, self.default_timeout)
    }
}

impl TetherConfig {
    /// Load from [`config_path`]. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match Self::parse(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// `$TETHER_CONFIG` when set and non-empty, otherwise `~/.tether/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".tether").join("config.toml"))
}
