//! Orchestrator configuration
//!
//! Defaults are compiled in, a TOML file may override them, and `COORD_*`
//! environment variables override both:
//!
//! ```toml
//! [orchestrator]
//! max_concurrent_tasks = 4
//! agent_timeout_ms = 60000
//! default_algorithm = "majority_vote"
//!
//! [routing]
//! default_agent = "generalist"
//!
//! [routing.domains.backend]
//! preferred_agents = ["api-expert", "db-expert"]
//! fallback_strategy = "pipeline"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consensus::ConsensusAlgorithm;
use crate::router::RoutingRules;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const ENV_MAX_CONCURRENT_TASKS: &str = "COORD_MAX_CONCURRENT_TASKS";
pub const ENV_AGENT_TIMEOUT_MS: &str = "COORD_AGENT_TIMEOUT_MS";
pub const ENV_LEARNING_INTERVAL_MS: &str = "COORD_LEARNING_INTERVAL_MS";
pub const ENV_DEFAULT_ALGORITHM: &str = "COORD_DEFAULT_ALGORITHM";

/// Queue, timeout and learning settings, consumed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tasks executing at once; further submissions wait
    pub max_concurrent_tasks: usize,
    /// Bound on each individual agent call
    pub agent_timeout_ms: u64,
    /// Algorithm for ensembles and sessions unless the caller picks one
    pub default_algorithm: ConsensusAlgorithm,
    /// Quality gate after ensemble and session strategies
    pub quality_gate: bool,
    /// Learning loop analysis period
    pub learning_interval_ms: u64,
    /// Execution records kept for analysis
    pub history_capacity: usize,
    /// Most recent records inspected per analysis cycle
    pub analysis_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            agent_timeout_ms: 300_000,
            default_algorithm: ConsensusAlgorithm::ConfidenceBased,
            quality_gate: true,
            learning_interval_ms: 300_000,
            history_capacity: 1000,
            analysis_window: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults with `COORD_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key → value source. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => {
                    debug!(key, value = %raw, "Config override from environment");
                    Some(value)
                }
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable config override");
                    None
                }
            }
        }

        if let Some(v) = parsed(ENV_MAX_CONCURRENT_TASKS, lookup(ENV_MAX_CONCURRENT_TASKS)) {
            self.max_concurrent_tasks = v;
        }
        if let Some(v) = parsed(ENV_AGENT_TIMEOUT_MS, lookup(ENV_AGENT_TIMEOUT_MS)) {
            self.agent_timeout_ms = v;
        }
        if let Some(v) = parsed(ENV_LEARNING_INTERVAL_MS, lookup(ENV_LEARNING_INTERVAL_MS)) {
            self.learning_interval_ms = v;
        }
        if let Some(v) = parsed(ENV_DEFAULT_ALGORITHM, lookup(ENV_DEFAULT_ALGORITHM)) {
            self.default_algorithm = v;
        }
    }

    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn with_agent_timeout_ms(mut self, ms: u64) -> Self {
        self.agent_timeout_ms = ms;
        self
    }

    pub fn with_default_algorithm(mut self, algorithm: ConsensusAlgorithm) -> Self {
        self.default_algorithm = algorithm;
        self
    }

    pub fn with_quality_gate(mut self, enabled: bool) -> Self {
        self.quality_gate = enabled;
        self
    }

    pub fn with_learning_interval_ms(mut self, ms: u64) -> Self {
        self.learning_interval_ms = ms;
        self
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn learning_interval(&self) -> Duration {
        Duration::from_millis(self.learning_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.agent_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.agent_timeout_ms must be positive".to_string(),
            ));
        }
        if self.learning_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.learning_interval_ms must be positive".to_string(),
            ));
        }
        if self.history_capacity == 0 || self.analysis_window == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.history_capacity and analysis_window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub orchestrator: OrchestratorConfig,
    pub routing: RoutingRules,
}

impl CoordinationConfig {
    /// Parse TOML. Environment overrides are not applied.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.routing = config.routing.normalized()?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Load a TOML file and apply `COORD_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.orchestrator.apply_env_overrides();
        config.orchestrator.validate()?;
        debug!(path = %path.display(), "Loaded coordination config");
        Ok(config)
    }
}
