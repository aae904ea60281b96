//! Byzantine fault tolerant agreement
//!
//! With `n` participants and fault budget `f`, a consensus exists only when
//! `n ≥ 3f + 1` and some cluster of mutually similar answers holds at least
//! `n − f` members. Failing either check is an error; there is no softer
//! fallback.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::warn;

use super::{first_max_by, Candidate, ConsensusAlgorithm, ConsensusError, ConsensusOptions};
use super::{ConsensusOutcome, ConsensusResult};
use crate::state::types::AgentOutput;

/// Similarity at or above which two answers share a cluster
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Similarity of two answers in 0.0-1.0.
///
/// Mean of whichever factors both answers carry: confidence closeness,
/// type equality, output word overlap, numeric closeness. With no shared
/// factor, answers are similar only if identical.
pub fn similarity(a: &AgentOutput, b: &AgentOutput) -> f64 {
    let mut factors: Vec<f64> = Vec::with_capacity(4);

    if let (Some(x), Some(y)) = (a.confidence, b.confidence) {
        factors.push(1.0 - (x - y).abs());
    }
    if let (Some(x), Some(y)) = (&a.result_type, &b.result_type) {
        factors.push(if x == y { 1.0 } else { 0.0 });
    }
    if let (Some(x), Some(y)) = (&a.output, &b.output) {
        factors.push(word_overlap(x, y));
    }
    if let (Some(x), Some(y)) = (a.value, b.value) {
        factors.push(numeric_closeness(x, y));
    }

    if factors.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    factors.iter().sum::<f64>() / factors.len() as f64
}

/// Jaccard overlap of lowercase word sets
fn word_overlap(a: &str, b: &str) -> f64 {
    let words = |s: &str| -> HashSet<String> {
        WORD_RE
            .find_iter(&s.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    };
    let (a, b) = (words(a), words(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn numeric_closeness(x: f64, y: f64) -> f64 {
    let scale = x.abs().max(y.abs());
    if scale == 0.0 {
        return 1.0;
    }
    (1.0 - (x - y).abs() / scale).max(0.0)
}

/// Greedy single pass: each answer joins the first cluster whose seed it
/// resembles, or seeds a new one.
fn cluster<'a>(candidates: &[Candidate<'a>], threshold: f64) -> Vec<Vec<Candidate<'a>>> {
    let mut clusters: Vec<Vec<Candidate<'a>>> = Vec::new();
    for candidate in candidates {
        let home = clusters
            .iter()
            .position(|members| similarity(members[0].output, candidate.output) >= threshold);
        match home {
            Some(idx) => clusters[idx].push(*candidate),
            None => clusters.push(vec![*candidate]),
        }
    }
    clusters
}

/// Fields from the most confident member. Value and confidence are blended
/// across the cluster only where members disagree on them.
fn representative(members: &[Candidate<'_>]) -> AgentOutput {
    let Some((lead_idx, _)) = first_max_by(members, Candidate::confidence) else {
        return AgentOutput::default();
    };
    let lead = members[lead_idx].output;
    let mut consensus = lead.clone();
    if members.len() == 1 {
        return consensus;
    }

    let total_confidence: f64 = members.iter().map(Candidate::confidence).sum();
    let values: Option<Vec<f64>> = members.iter().map(|m| m.output.value).collect();
    if let Some(values) = values.filter(|v| v.iter().any(|x| Some(*x) != lead.value)) {
        let blended = if total_confidence > 0.0 {
            members
                .iter()
                .zip(&values)
                .map(|(m, v)| v * m.confidence())
                .sum::<f64>()
                / total_confidence
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        consensus.value = Some(blended);
    }

    let reported = members.iter().any(|m| m.output.confidence.is_some());
    let uniform = members.iter().all(|m| m.output.confidence == lead.confidence);
    if reported && !uniform {
        consensus.confidence = Some(total_confidence / members.len() as f64);
    }
    consensus
}

pub(crate) fn byzantine_fault_tolerant(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let n = candidates.len();
    let f = options
        .fault_tolerance
        .unwrap_or_else(|| n.saturating_sub(1) / 3);
    let quorum = f.saturating_mul(3).saturating_add(1);

    if n < quorum {
        warn!(participants = n, fault_tolerance = f, "Byzantine quorum impossible");
        return Err(ConsensusError::ByzantineQuorum {
            reason: format!("{n} participants cannot tolerate {f} faults (need at least {quorum})"),
        });
    }

    let clusters = cluster(candidates, options.similarity_threshold);
    let (largest_idx, _) = first_max_by(&clusters, |members| members.len() as f64)
        .ok_or(ConsensusError::NoValidResults { failed: 0 })?;
    let largest = &clusters[largest_idx];
    let required = n - f;

    if largest.len() < required {
        warn!(
            participants = n,
            cluster_size = largest.len(),
            required,
            "Byzantine agreement not reached"
        );
        return Err(ConsensusError::ByzantineQuorum {
            reason: format!(
                "largest agreement cluster has {} of {n} members, need {required}",
                largest.len()
            ),
        });
    }

    let members: Vec<&str> = largest.iter().map(|c| c.agent_id).collect();
    Ok(ConsensusOutcome::new(
        representative(largest),
        largest.len() as f64 / n as f64,
        ConsensusAlgorithm::ByzantineFaultTolerant,
    )
    .with_meta("faultTolerance", f)
    .with_meta("requiredAgreement", required)
    .with_meta("clusterSize", largest.len())
    .with_meta("clusterCount", clusters.len())
    .with_meta("clusterMembers", json!(members)))
}
