//! Agent-weighted algorithms: `expert_override` and `dynamic_weighting`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::voting::confidence_based;
use super::{first_max_by, Candidate, ConsensusAlgorithm, ConsensusError, ConsensusOptions};
use super::{ConsensusOutcome, ConsensusResult};
use crate::state::types::AgentId;

/// Bonus added to the winning expert's confidence
const EXPERT_BONUS: f64 = 0.1;
/// Contribution of a factor with no input
const NEUTRAL_FACTOR: f64 = 0.5;
/// Lowest contribution any factor can make
const FACTOR_FLOOR: f64 = 0.1;
/// Hours for recency to decay by a factor of e
const RECENCY_DECAY_HOURS: f64 = 24.0;

/// Relative weight of each dynamic-weighting factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorBlend {
    pub performance: f64,
    pub recency: f64,
    pub specialty: f64,
    pub accuracy: f64,
}

impl Default for FactorBlend {
    fn default() -> Self {
        Self {
            performance: 0.3,
            recency: 0.2,
            specialty: 0.3,
            accuracy: 0.2,
        }
    }
}

/// Optional per-agent inputs, each 0.0-1.0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSignals {
    pub performance: Option<f64>,
    pub recency: Option<f64>,
    pub specialty_relevance: Option<f64>,
    pub consensus_accuracy: Option<f64>,
}

impl AgentSignals {
    pub fn with_performance(mut self, performance: f64) -> Self {
        self.performance = Some(performance);
        self
    }

    pub fn with_recency(mut self, recency: f64) -> Self {
        self.recency = Some(recency);
        self
    }

    pub fn with_specialty_relevance(mut self, relevance: f64) -> Self {
        self.specialty_relevance = Some(relevance);
        self
    }

    pub fn with_consensus_accuracy(mut self, accuracy: f64) -> Self {
        self.consensus_accuracy = Some(accuracy);
        self
    }

    /// Recency score for an agent last active at `last_active`
    pub fn recency_since(last_active: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let hours = (now - last_active).num_seconds().max(0) as f64 / 3600.0;
        (-hours / RECENCY_DECAY_HOURS).exp()
    }
}

/// Settings for `dynamic_weighting`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicWeighting {
    pub blend: FactorBlend,
    pub signals: HashMap<AgentId, AgentSignals>,
}

impl DynamicWeighting {
    /// Blended weight for an agent, never below the factor floor
    pub fn weight_for(&self, agent_id: &str) -> f64 {
        let signals = self.signals.get(agent_id).cloned().unwrap_or_default();
        let factor = |value: Option<f64>| value.unwrap_or(NEUTRAL_FACTOR).clamp(FACTOR_FLOOR, 1.0);

        self.blend.performance * factor(signals.performance)
            + self.blend.recency * factor(signals.recency)
            + self.blend.specialty * factor(signals.specialty_relevance)
            + self.blend.accuracy * factor(signals.consensus_accuracy)
    }
}

pub(crate) fn expert_override(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let experts: Vec<Candidate<'_>> = candidates
        .iter()
        .copied()
        .filter(|c| options.expert_agents.contains(c.agent_id))
        .collect();

    let Some((best_idx, best_score)) =
        first_max_by(&experts, |c| options.expert_priority(c.agent_id) * c.confidence())
    else {
        let outcome = confidence_based(candidates, options)?;
        return Ok(outcome.with_meta("fallbackFrom", ConsensusAlgorithm::ExpertOverride.as_str()));
    };

    let best = experts[best_idx];
    let confidence = (best.confidence() + EXPERT_BONUS).min(1.0);

    Ok(
        ConsensusOutcome::new(best.output.clone(), confidence, ConsensusAlgorithm::ExpertOverride)
            .with_meta("expertCount", experts.len())
            .with_meta("expertScore", best_score)
            .with_meta("selectedAgent", best.agent_id),
    )
}

pub(crate) fn dynamic_weighting(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| options.dynamic.weight_for(c.agent_id))
        .collect();

    let scored: Vec<(Candidate<'_>, f64)> = candidates
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .collect();
    let (best_idx, best_score) = first_max_by(&scored, |(c, w)| c.confidence() * w)
        .ok_or(ConsensusError::NoValidResults { failed: 0 })?;
    let best = scored[best_idx].0;

    let average_weight = weights.iter().sum::<f64>() / weights.len() as f64;
    let confidence = if average_weight > 0.0 {
        (best_score / average_weight).min(1.0)
    } else {
        0.0
    };

    let weight_map: Map<String, Value> = candidates
        .iter()
        .zip(&weights)
        .map(|(c, w)| (c.agent_id.to_string(), json!(w)))
        .collect();

    Ok(
        ConsensusOutcome::new(best.output.clone(), confidence, ConsensusAlgorithm::DynamicWeighting)
            .with_meta("weights", weight_map)
            .with_meta("maxWeightedScore", best_score)
            .with_meta("averageWeight", average_weight)
            .with_meta("selectedAgent", best.agent_id),
    )
}
