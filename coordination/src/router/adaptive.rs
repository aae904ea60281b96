//! Adaptive router: maps a task profile to an execution strategy.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::analyzer::TaskProfile;
use super::rules::RoutingRules;
use crate::state::types::{AgentId, ExecutionStrategy, StrategyKind};

/// Above this complexity every task becomes a collaborative session
pub const COLLABORATION_COMPLEXITY: f64 = 0.8;
/// Above this complexity a task is fanned out to an ensemble
pub const ENSEMBLE_COMPLEXITY: f64 = 0.6;

const MAX_SESSION_AGENTS: usize = 3;
const MAX_ENSEMBLE_AGENTS: usize = 2;

/// Routing outcome with the reason it was chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: ExecutionStrategy,
    pub rationale: String,
    /// Advisory fallback from the domain's rule, surfaced for operators
    pub fallback_strategy: StrategyKind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveRouter;

impl AdaptiveRouter {
    pub fn new() -> Self {
        Self
    }

    /// Pick a strategy. First match wins; never fails.
    pub fn route(&self, profile: &TaskProfile, rules: &RoutingRules) -> RoutingDecision {
        let rule = rules.rule_for(&profile.domain);
        let mut preferred = rule.preferred_agents;
        if preferred.is_empty() {
            preferred.push(rules.default_agent.clone());
        }

        let (strategy, rationale) = if profile.complexity > COLLABORATION_COMPLEXITY
            || profile.collaboration_needed
        {
            (
                ExecutionStrategy::CollaborativeSession {
                    agents: take(&preferred, MAX_SESSION_AGENTS),
                },
                format!(
                    "complexity={:.2} collaboration_needed={} → collaborative session",
                    profile.complexity, profile.collaboration_needed
                ),
            )
        } else if profile.complexity > ENSEMBLE_COMPLEXITY {
            (
                ExecutionStrategy::Ensemble {
                    agents: take(&preferred, MAX_ENSEMBLE_AGENTS),
                },
                format!("complexity={:.2} → ensemble", profile.complexity),
            )
        } else if preferred.len() > 1 {
            (
                ExecutionStrategy::Pipeline {
                    agents: preferred.clone(),
                },
                format!("{} preferred agents → pipeline", preferred.len()),
            )
        } else {
            let agent = preferred
                .first()
                .cloned()
                .unwrap_or_else(|| rules.default_agent.clone());
            (
                ExecutionStrategy::SingleAgent { agent },
                "single preferred agent → single agent".to_string(),
            )
        };

        info!(
            domain = %profile.domain,
            complexity = profile.complexity,
            strategy = %strategy.kind(),
            agents = ?strategy.agents(),
            "Routed task"
        );

        RoutingDecision {
            strategy,
            rationale,
            fallback_strategy: rule.fallback_strategy,
        }
    }
}

fn take(agents: &[AgentId], limit: usize) -> Vec<AgentId> {
    agents.iter().take(limit).cloned().collect()
}
