//! Vote- and confidence-driven algorithms
//!
//! `majority_vote`, `weighted_average` and `confidence_based`.

use serde_json::{json, Map, Value};

use super::{first_max_by, Candidate, ConsensusAlgorithm, ConsensusError, ConsensusOptions};
use super::{ConsensusOutcome, ConsensusResult};
use crate::state::types::AgentOutput;

/// Characters of `output` that identify an answer for voting
const OUTPUT_PREFIX_CHARS: usize = 100;

/// Identity of an answer for voting purposes.
///
/// Chosen from the first field present: numeric value, output prefix,
/// result type, then the whole serialized record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalKey {
    /// Bit pattern of the value (`-0.0` folded into `0.0`)
    Value(u64),
    /// blake3 hex digest of the trimmed output prefix
    Output(String),
    Type(String),
    Opaque(String),
}

impl CanonicalKey {
    pub fn of(output: &AgentOutput) -> Self {
        if let Some(value) = output.value {
            let value = if value == 0.0 { 0.0 } else { value };
            return Self::Value(value.to_bits());
        }
        if let Some(text) = output.output.as_deref() {
            let prefix: String = text.trim().chars().take(OUTPUT_PREFIX_CHARS).collect();
            return Self::Output(blake3::hash(prefix.as_bytes()).to_hex().to_string());
        }
        if let Some(result_type) = &output.result_type {
            return Self::Type(result_type.clone());
        }
        Self::Opaque(serde_json::to_string(output).unwrap_or_default())
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(bits) => write!(f, "value:{}", f64::from_bits(*bits)),
            Self::Output(digest) => write!(f, "output:{}", &digest[..digest.len().min(16)]),
            Self::Type(t) => write!(f, "type:{t}"),
            Self::Opaque(raw) => write!(f, "opaque:{raw}"),
        }
    }
}

struct Tally {
    key: CanonicalKey,
    weight: f64,
    first: usize,
    voters: usize,
}

pub(crate) fn majority_vote(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let mut tallies: Vec<Tally> = Vec::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        let key = CanonicalKey::of(candidate.output);
        let weight = options.agent_weight(candidate.agent_id);
        match tallies.iter_mut().find(|t| t.key == key) {
            Some(tally) => {
                tally.weight += weight;
                tally.voters += 1;
            }
            None => tallies.push(Tally {
                key,
                weight,
                first: idx,
                voters: 1,
            }),
        }
    }

    let (winner_idx, winning_weight) =
        first_max_by(&tallies, |t| t.weight).ok_or(ConsensusError::NoValidResults { failed: 0 })?;
    let winner = &tallies[winner_idx];
    let total_weight: f64 = tallies.iter().map(|t| t.weight).sum();
    let confidence = if total_weight > 0.0 {
        winning_weight / total_weight
    } else {
        0.0
    };

    let votes: Map<String, Value> = tallies
        .iter()
        .map(|t| (t.key.to_string(), json!(t.weight)))
        .collect();

    Ok(ConsensusOutcome::new(
        candidates[winner.first].output.clone(),
        confidence,
        ConsensusAlgorithm::MajorityVote,
    )
    .with_meta("votes", votes)
    .with_meta("totalWeight", total_weight)
    .with_meta("winningWeight", winning_weight)
    .with_meta("winningVoters", winner.voters)
    .with_meta("distinctAnswers", tallies.len())
    .with_meta("selectedAgent", candidates[winner.first].agent_id))
}

pub(crate) fn weighted_average(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    if let [only] = candidates {
        return Ok(ConsensusOutcome::new(
            only.output.clone(),
            only.confidence(),
            ConsensusAlgorithm::WeightedAverage,
        )
        .with_meta("selectedAgent", only.agent_id));
    }

    let values: Option<Vec<f64>> = candidates.iter().map(|c| c.output.value).collect();
    let Some(values) = values else {
        let outcome = confidence_based(candidates, options)?;
        return Ok(outcome.with_meta("fallbackFrom", ConsensusAlgorithm::WeightedAverage.as_str()));
    };
    if candidates.is_empty() {
        return Err(ConsensusError::NoValidResults { failed: 0 });
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (candidate, value) in candidates.iter().zip(&values) {
        let weight = candidate.confidence() * options.agent_weight(candidate.agent_id);
        weighted_sum += value * weight;
        total_weight += weight;
    }

    let mean = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };
    let confidence = (total_weight / candidates.len() as f64).clamp(0.0, 1.0);

    let mut consensus = AgentOutput::numeric(mean).with_confidence(confidence);
    let first_type = candidates[0].output.result_type.as_ref();
    if candidates.iter().all(|c| c.output.result_type.as_ref() == first_type) {
        consensus.result_type = first_type.cloned();
    }

    Ok(
        ConsensusOutcome::new(consensus, confidence, ConsensusAlgorithm::WeightedAverage)
            .with_meta("totalWeight", total_weight)
            .with_meta("values", values),
    )
}

pub(crate) fn confidence_based(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let threshold = options.confidence_threshold;
    let qualified: Vec<Candidate<'_>> = candidates
        .iter()
        .copied()
        .filter(|c| c.confidence() >= threshold)
        .collect();
    let threshold_met = !qualified.is_empty();
    let pool = if threshold_met { qualified } else { candidates.to_vec() };

    let (winner_idx, winner_confidence) =
        first_max_by(&pool, Candidate::confidence).ok_or(ConsensusError::NoValidResults { failed: 0 })?;
    let winner = pool[winner_idx];

    let confidences: Vec<f64> = pool.iter().map(Candidate::confidence).collect();
    let n = confidences.len() as f64;
    let mean = confidences.iter().sum::<f64>() / n;
    let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    let strength = ((1.0 - variance.sqrt()) + mean) / 2.0;

    Ok(ConsensusOutcome::new(
        winner.output.clone(),
        winner_confidence,
        ConsensusAlgorithm::ConfidenceBased,
    )
    .with_meta("averageConfidence", mean)
    .with_meta("consensusStrength", strength)
    .with_meta("threshold", threshold)
    .with_meta("thresholdMet", threshold_met)
    .with_meta("qualified", pool.len())
    .with_meta("selectedAgent", winner.agent_id))
}
