//! Static per-domain routing rules, loaded once at startup

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};
use crate::state::types::{AgentId, StrategyKind};

/// Agent used when no rule names one
pub const DEFAULT_AGENT_ID: &str = "generalist";

fn default_agent_id() -> AgentId {
    DEFAULT_AGENT_ID.to_string()
}

/// Routing preferences for one domain
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Agents to use, in preference order
    #[serde(default)]
    pub preferred_agents: Vec<AgentId>,

    /// Advisory strategy for operators when the chosen one fails
    #[serde(default)]
    pub fallback_strategy: StrategyKind,
}

impl RoutingRule {
    pub fn new<I, S>(preferred_agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        Self {
            preferred_agents: preferred_agents.into_iter().map(Into::into).collect(),
            fallback_strategy: StrategyKind::default(),
        }
    }

    pub fn with_fallback(mut self, strategy: StrategyKind) -> Self {
        self.fallback_strategy = strategy;
        self
    }
}

/// Domain → rule table plus the default agent
///
/// ```toml
/// default_agent = "generalist"
///
/// [domains.backend]
/// preferred_agents = ["api-expert", "db-expert"]
/// fallback_strategy = "pipeline"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRules {
    #[serde(default = "default_agent_id")]
    pub default_agent: AgentId,

    #[serde(default)]
    pub domains: HashMap<String, RoutingRule>,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            default_agent: default_agent_id(),
            domains: HashMap::new(),
        }
    }
}

impl RoutingRules {
    pub fn new(default_agent: impl Into<AgentId>) -> Self {
        Self {
            default_agent: default_agent.into(),
            domains: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, domain: impl Into<String>, rule: RoutingRule) -> Self {
        self.domains.insert(domain.into().to_lowercase(), rule);
        self
    }

    /// Rule for a domain; the default rule is the single default agent
    pub fn rule_for(&self, domain: &str) -> RoutingRule {
        self.domains
            .get(&domain.to_lowercase())
            .cloned()
            .unwrap_or_else(|| RoutingRule::new([self.default_agent.clone()]))
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        toml::from_str::<Self>(raw)?.normalized()
    }

    /// Lowercase domain keys and validate
    pub(crate) fn normalized(mut self) -> ConfigResult<Self> {
        self.domains = self
            .domains
            .into_iter()
            .map(|(domain, rule)| (domain.to_lowercase(), rule))
            .collect();
        self.validate()?;
        Ok(self)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_agent.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "routing.default_agent must not be empty".to_string(),
            ));
        }
        for (domain, rule) in &self.domains {
            if rule.preferred_agents.iter().any(|a| a.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "routing.domains.{domain} lists an empty agent id"
                )));
            }
        }
        Ok(())
    }
}
