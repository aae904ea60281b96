//! Composite-quality selection (`quality_threshold`)

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{first_max_by, Candidate, ConsensusAlgorithm, ConsensusError, ConsensusOptions};
use super::{ConsensusOutcome, ConsensusResult};
use crate::state::types::{AgentOutput, DEFAULT_CONFIDENCE};

/// Minimum composite quality for an answer to qualify
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Word count at which a textual answer counts as complete
const COMPLETE_WORD_COUNT: f64 = 50.0;
const WARNING_PENALTY: f64 = 0.1;
const ERROR_PENALTY: f64 = 0.5;

/// Metrics averaged into the composite quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetric {
    Confidence,
    Completeness,
    Accuracy,
}

impl QualityMetric {
    pub fn all() -> &'static [QualityMetric] {
        &[Self::Confidence, Self::Completeness, Self::Accuracy]
    }

    pub fn score(&self, output: &AgentOutput) -> f64 {
        match self {
            Self::Confidence => output.confidence_or_default(),
            Self::Completeness => heuristic_completeness(output),
            Self::Accuracy => heuristic_accuracy(output),
        }
    }
}

/// Reported completeness, else estimated from what the answer carries
pub fn heuristic_completeness(output: &AgentOutput) -> f64 {
    if let Some(completeness) = output.completeness {
        return completeness.clamp(0.0, 1.0);
    }
    match (&output.output, output.value) {
        (Some(text), _) => {
            let words = text.split_whitespace().count() as f64;
            (words / COMPLETE_WORD_COUNT).min(1.0)
        }
        (None, Some(_)) => 1.0,
        (None, None) => DEFAULT_CONFIDENCE,
    }
}

/// Reported accuracy, else confidence discounted by warnings and error flags
pub fn heuristic_accuracy(output: &AgentOutput) -> f64 {
    if let Some(accuracy) = output.accuracy {
        return accuracy.clamp(0.0, 1.0);
    }
    let mut score = output.confidence_or_default();
    score -= WARNING_PENALTY * output.warnings.len() as f64;
    if output.has_error_flag() {
        score -= ERROR_PENALTY;
    }
    score.clamp(0.0, 1.0)
}

/// Mean of the metric scores; confidence alone when no metric is configured
pub fn composite_quality(output: &AgentOutput, metrics: &[QualityMetric]) -> f64 {
    if metrics.is_empty() {
        return output.confidence_or_default();
    }
    metrics.iter().map(|m| m.score(output)).sum::<f64>() / metrics.len() as f64
}

pub(crate) fn quality_threshold(
    candidates: &[Candidate<'_>],
    options: &ConsensusOptions,
) -> ConsensusResult<ConsensusOutcome> {
    let threshold = options.quality_threshold;
    let scored: Vec<(Candidate<'_>, f64)> = candidates
        .iter()
        .map(|c| (*c, composite_quality(c.output, &options.quality_metrics)))
        .collect();

    let qualifiers: Vec<(Candidate<'_>, f64)> = scored
        .iter()
        .copied()
        .filter(|(_, quality)| *quality >= threshold)
        .collect();
    let threshold_met = !qualifiers.is_empty();
    let pool = if threshold_met { &qualifiers } else { &scored };

    let (best_idx, best_quality) = first_max_by(pool, |(_, quality)| *quality)
        .ok_or(ConsensusError::NoValidResults { failed: 0 })?;
    let best = pool[best_idx].0;

    let scores: Map<String, Value> = scored
        .iter()
        .map(|(c, quality)| (c.agent_id.to_string(), json!(quality)))
        .collect();

    Ok(
        ConsensusOutcome::new(best.output.clone(), best_quality, ConsensusAlgorithm::QualityThreshold)
            .with_meta("threshold", threshold)
            .with_meta("thresholdMet", threshold_met)
            .with_meta("qualified", qualifiers.len())
            .with_meta("qualityScores", scores)
            .with_meta("selectedAgent", best.agent_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusEngine;
    use crate::state::types::AgentResponse;

    #[test]
    fn test_completeness_heuristics() {
        assert_eq!(heuristic_completeness(&AgentOutput::numeric(3.0)), 1.0);
        assert_eq!(heuristic_completeness(&AgentOutput::default()), 0.5);
        assert_eq!(
            heuristic_completeness(&AgentOutput::text("word ".repeat(25))),
            0.5
        );
        assert_eq!(
            heuristic_completeness(&AgentOutput::text("x").with_completeness(0.9)),
            0.9
        );
    }

    #[test]
    fn test_accuracy_heuristics() {
        let clean = AgentOutput::numeric(1.0).with_confidence(0.9);
        assert!((heuristic_accuracy(&clean) - 0.9).abs() < 1e-9);

        let noisy = clean.clone().with_warning("w1").with_warning("w2");
        assert!((heuristic_accuracy(&noisy) - 0.7).abs() < 1e-9);

        let broken = clean.with_error("bad");
        assert!((heuristic_accuracy(&broken) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_selects_best_qualifier() {
        let responses = vec![
            AgentResponse::success(
                "a",
                AgentOutput::numeric(1.0).with_confidence(0.75).with_accuracy(0.75),
            ),
            AgentResponse::success(
                "b",
                AgentOutput::numeric(2.0).with_confidence(0.95).with_accuracy(0.95),
            ),
        ];
        let outcome = ConsensusEngine::new()
            .build(&responses, "quality_threshold", &ConsensusOptions::default())
            .unwrap();

        // b: (0.95 + 1.0 + 0.95) / 3
        assert_eq!(outcome.consensus.value, Some(2.0));
        assert!((outcome.confidence - 2.9 / 3.0).abs() < 1e-9);
        assert_eq!(outcome.metadata["thresholdMet"], json!(true));
        assert_eq!(outcome.metadata["qualified"], json!(2));
    }

    #[test]
    fn test_none_qualify_returns_best_available() {
        let responses = vec![
            AgentResponse::success("a", AgentOutput::text("short").with_confidence(0.2)),
            AgentResponse::success("b", AgentOutput::text("also short").with_confidence(0.3)),
        ];
        let outcome = ConsensusEngine::new()
            .build(&responses, "quality_threshold", &ConsensusOptions::default())
            .unwrap();

        assert_eq!(outcome.consensus.output.as_deref(), Some("also short"));
        assert_eq!(outcome.metadata["thresholdMet"], json!(false));
    }

    #[test]
    fn test_metric_selection() {
        let options = ConsensusOptions::default().with_quality_metrics(vec![QualityMetric::Confidence]);
        let responses = vec![AgentResponse::success(
            "a",
            AgentOutput::text("x").with_confidence(0.72),
        )];
        let outcome = ConsensusEngine::new()
            .build(&responses, "quality_threshold", &options)
            .unwrap();
        assert_eq!(outcome.confidence, 0.72);
    }
}
