//! Consensus Engine: reconciles several agents' answers into one result
//!
//! Failed responses are dropped before any algorithm runs and reported as
//! `failed` in the outcome metadata.
//!
//! ```text
//! Algorithm                | Picks                                    | Confidence
//! -------------------------|------------------------------------------|---------------------------
//! majority_vote            | heaviest canonical key                   | winning / total weight
//! weighted_average         | confidence×weight mean of numeric values | total weight / participants
//! confidence_based         | most confident (above threshold)         | winner's confidence
//! expert_override          | max priority×confidence among experts    | min(conf + 0.1, 1)
//! byzantine_fault_tolerant | largest similarity cluster (≥ n − f)     | cluster size / n
//! dynamic_weighting        | max confidence × per-agent weight        | max score / mean weight
//! quality_threshold        | best composite quality                   | winner's quality
//! ```
//!
//! All algorithms are pure: inputs are borrowed and never modified.
//!
//! # Usage
//!
//! ```ignore
//! let engine = ConsensusEngine::new();
//! let outcome = engine.build(&responses, "majority_vote", &ConsensusOptions::default())?;
//! info!(confidence = outcome.confidence, "agreed on {:?}", outcome.consensus.value);
//! ```

pub mod byzantine;
pub mod expert;
pub mod quality;
pub mod voting;

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::state::types::{AgentId, AgentOutput, AgentResponse, ConsensusSummary};

pub use byzantine::{similarity, DEFAULT_SIMILARITY_THRESHOLD};
pub use expert::{AgentSignals, DynamicWeighting, FactorBlend};
pub use quality::{QualityMetric, DEFAULT_QUALITY_THRESHOLD};
pub use voting::CanonicalKey;

/// Error type for consensus operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Unknown consensus algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("No valid results: all {failed} responses carried errors")]
    NoValidResults { failed: usize },

    #[error("Byzantine quorum not met: {reason}")]
    ByzantineQuorum { reason: String },
}

impl ConsensusError {
    /// Stable snake_case code
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAlgorithm(_) => "unknown_algorithm",
            Self::NoValidResults { .. } => "no_valid_results",
            Self::ByzantineQuorum { .. } => "byzantine_quorum",
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// The seven agreement algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAlgorithm {
    MajorityVote,
    WeightedAverage,
    #[default]
    ConfidenceBased,
    ExpertOverride,
    ByzantineFaultTolerant,
    DynamicWeighting,
    QualityThreshold,
}

impl ConsensusAlgorithm {
    pub fn all() -> &'static [ConsensusAlgorithm] {
        &[
            Self::MajorityVote,
            Self::WeightedAverage,
            Self::ConfidenceBased,
            Self::ExpertOverride,
            Self::ByzantineFaultTolerant,
            Self::DynamicWeighting,
            Self::QualityThreshold,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MajorityVote => "majority_vote",
            Self::WeightedAverage => "weighted_average",
            Self::ConfidenceBased => "confidence_based",
            Self::ExpertOverride => "expert_override",
            Self::ByzantineFaultTolerant => "byzantine_fault_tolerant",
            Self::DynamicWeighting => "dynamic_weighting",
            Self::QualityThreshold => "quality_threshold",
        }
    }
}

impl std::fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConsensusAlgorithm {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConsensusError::UnknownAlgorithm(s.to_string()))
    }
}

/// Tuning knobs shared by all algorithms. Each algorithm reads only its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusOptions {
    /// Per-agent vote/average weight (default 1.0)
    pub agent_weights: HashMap<AgentId, f64>,
    /// `confidence_based` cut-off
    pub confidence_threshold: f64,
    /// Agents whose answers `expert_override` considers
    pub expert_agents: BTreeSet<AgentId>,
    /// `expert_override` priority per expert (default 1.0)
    pub expert_priorities: HashMap<AgentId, f64>,
    /// `f` for `byzantine_fault_tolerant`; defaults to ⌊(n−1)/3⌋
    pub fault_tolerance: Option<usize>,
    pub similarity_threshold: f64,
    pub dynamic: DynamicWeighting,
    /// Metrics averaged by `quality_threshold`
    pub quality_metrics: Vec<QualityMetric>,
    pub quality_threshold: f64,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            agent_weights: HashMap::new(),
            confidence_threshold: 0.0,
            expert_agents: BTreeSet::new(),
            expert_priorities: HashMap::new(),
            fault_tolerance: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dynamic: DynamicWeighting::default(),
            quality_metrics: QualityMetric::all().to_vec(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

impl ConsensusOptions {
    pub fn agent_weight(&self, agent_id: &str) -> f64 {
        self.agent_weights.get(agent_id).copied().unwrap_or(1.0)
    }

    pub fn expert_priority(&self, agent_id: &str) -> f64 {
        self.expert_priorities.get(agent_id).copied().unwrap_or(1.0)
    }

    pub fn with_agent_weight(mut self, agent_id: impl Into<AgentId>, weight: f64) -> Self {
        self.agent_weights.insert(agent_id.into(), weight);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_expert(mut self, agent_id: impl Into<AgentId>, priority: f64) -> Self {
        let agent_id = agent_id.into();
        self.expert_priorities.insert(agent_id.clone(), priority);
        self.expert_agents.insert(agent_id);
        self
    }

    pub fn with_fault_tolerance(mut self, f: usize) -> Self {
        self.fault_tolerance = Some(f);
        self
    }

    pub fn with_agent_signals(mut self, agent_id: impl Into<AgentId>, signals: AgentSignals) -> Self {
        self.dynamic.signals.insert(agent_id.into(), signals);
        self
    }

    pub fn with_quality_metrics(mut self, metrics: Vec<QualityMetric>) -> Self {
        self.quality_metrics = metrics;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }
}

/// A non-failed response, borrowed from the caller's input
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub agent_id: &'a str,
    pub output: &'a AgentOutput,
}

impl Candidate<'_> {
    pub fn confidence(&self) -> f64 {
        self.output.confidence_or_default()
    }
}

/// Index of the first maximum; ties keep the earliest entry
pub(crate) fn first_max_by<T>(items: &[T], score: impl Fn(&T) -> f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, item) in items.iter().enumerate() {
        let s = score(item);
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((idx, s)),
        }
    }
    best
}

/// Result of one consensus call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub consensus: AgentOutput,
    pub confidence: f64,
    pub algorithm: ConsensusAlgorithm,
    pub metadata: serde_json::Map<String, Value>,
}

impl ConsensusOutcome {
    pub(crate) fn new(consensus: AgentOutput, confidence: f64, algorithm: ConsensusAlgorithm) -> Self {
        Self {
            consensus,
            confidence,
            algorithm,
            metadata: serde_json::Map::new(),
        }
    }

    pub(crate) fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Participants that reached the algorithm
    pub fn participants(&self) -> usize {
        self.metadata
            .get("participants")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }

    /// Responses dropped for carrying errors
    pub fn failed(&self) -> usize {
        self.metadata
            .get("failed")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }

    pub fn summary(&self) -> ConsensusSummary {
        ConsensusSummary {
            algorithm: self.algorithm,
            confidence: self.confidence,
            participants: self.participants(),
            failed: self.failed(),
        }
    }
}

/// Entry point for all consensus algorithms
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusEngine;

impl ConsensusEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build consensus with an algorithm named at runtime
    pub fn build(
        &self,
        responses: &[AgentResponse],
        algorithm: &str,
        options: &ConsensusOptions,
    ) -> ConsensusResult<ConsensusOutcome> {
        let algorithm = algorithm.parse::<ConsensusAlgorithm>()?;
        self.build_with(responses, algorithm, options)
    }

    pub fn build_with(
        &self,
        responses: &[AgentResponse],
        algorithm: ConsensusAlgorithm,
        options: &ConsensusOptions,
    ) -> ConsensusResult<ConsensusOutcome> {
        let candidates: Vec<Candidate<'_>> = responses
            .iter()
            .filter_map(|r| {
                r.result().map(|output| Candidate {
                    agent_id: &r.agent_id,
                    output,
                })
            })
            .collect();
        let failed = responses.len() - candidates.len();

        debug!(
            algorithm = %algorithm,
            participants = candidates.len(),
            failed,
            "Building consensus"
        );

        // An empty input under BFT reports the quorum failure instead.
        let quorum_first =
            responses.is_empty() && algorithm == ConsensusAlgorithm::ByzantineFaultTolerant;
        if candidates.is_empty() && !quorum_first {
            return Err(ConsensusError::NoValidResults { failed });
        }

        let outcome = match algorithm {
            ConsensusAlgorithm::MajorityVote => voting::majority_vote(&candidates, options),
            ConsensusAlgorithm::WeightedAverage => voting::weighted_average(&candidates, options),
            ConsensusAlgorithm::ConfidenceBased => voting::confidence_based(&candidates, options),
            ConsensusAlgorithm::ExpertOverride => expert::expert_override(&candidates, options),
            ConsensusAlgorithm::ByzantineFaultTolerant => {
                byzantine::byzantine_fault_tolerant(&candidates, options)
            }
            ConsensusAlgorithm::DynamicWeighting => expert::dynamic_weighting(&candidates, options),
            ConsensusAlgorithm::QualityThreshold => quality::quality_threshold(&candidates, options),
        }?;

        info!(
            algorithm = %algorithm,
            resolved = %outcome.algorithm,
            confidence = outcome.confidence,
            participants = candidates.len(),
            failed,
            "Consensus reached"
        );

        Ok(outcome
            .with_meta("participants", candidates.len())
            .with_meta("failed", failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names_roundtrip() {
        for algorithm in ConsensusAlgorithm::all() {
            let parsed: ConsensusAlgorithm = algorithm.to_string().parse().unwrap();
            assert_eq!(parsed, *algorithm);

            let json = serde_json::to_value(algorithm).unwrap();
            assert_eq!(json, algorithm.as_str());
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        let err = ConsensusEngine::new()
            .build(&[], "coin_flip", &ConsensusOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::UnknownAlgorithm(ref name) if name == "coin_flip"));
        assert_eq!(err.kind(), "unknown_algorithm");
    }

    #[test]
    fn test_all_failed_is_no_valid_results() {
        let responses = vec![
            AgentResponse::failure("a", "boom"),
            AgentResponse::failure("b", "boom"),
        ];
        for algorithm in ConsensusAlgorithm::all() {
            let err = ConsensusEngine::new()
                .build_with(&responses, *algorithm, &ConsensusOptions::default())
                .unwrap_err();
            assert!(
                matches!(err, ConsensusError::NoValidResults { failed: 2 }),
                "{algorithm}: {err}"
            );
        }
    }

    #[test]
    fn test_empty_input_fails_bft_quorum() {
        let err = ConsensusEngine::new()
            .build(&[], "byzantine_fault_tolerant", &ConsensusOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::ByzantineQuorum { .. }));
    }

    #[test]
    fn test_metadata_counts_failures() {
        let responses = vec![
            AgentResponse::success("a", AgentOutput::numeric(1.0).with_confidence(0.9)),
            AgentResponse::failure("b", "timeout"),
        ];
        let outcome = ConsensusEngine::new()
            .build(&responses, "confidence_based", &ConsensusOptions::default())
            .unwrap();

        assert_eq!(outcome.participants(), 1);
        assert_eq!(outcome.failed(), 1);
        let summary = outcome.summary();
        assert_eq!(summary.algorithm, ConsensusAlgorithm::ConfidenceBased);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_first_max_keeps_earliest() {
        let scores = [0.2, 0.9, 0.9, 0.1];
        assert_eq!(first_max_by(&scores, |s| *s), Some((1, 0.9)));
        assert_eq!(first_max_by::<f64>(&[], |s| *s), None);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ConsensusOptions =
            serde_json::from_str(r#"{"confidence_threshold": 0.8}"#).unwrap();
        assert_eq!(options.confidence_threshold, 0.8);
        assert_eq!(options.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(options.agent_weight("anyone"), 1.0);
    }
}
