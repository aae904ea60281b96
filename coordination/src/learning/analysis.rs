//! Advisory proposals derived from recent executions.
//!
//! Proposals are outputs for operators; nothing here changes routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::ExecutionRecord;

/// Records inspected per analysis
pub const DEFAULT_ANALYSIS_WINDOW: usize = 100;
/// Below this success rate, retries should increase
pub const SUCCESS_RATE_FLOOR: f64 = 0.8;
/// Above this mean duration, agent selection should be revisited
pub const DURATION_CEILING_MS: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    IncreaseRetryAttempts,
    OptimizeAgentSelection,
}

impl std::fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncreaseRetryAttempts => write!(f, "increase_retry_attempts"),
            Self::OptimizeAgentSelection => write!(f, "optimize_agent_selection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub kind: ProposalKind,
    pub reason: String,
    /// Measured value that triggered the proposal
    pub observed: f64,
    pub threshold: f64,
}

/// Outcome of one analysis cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub window: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub proposals: Vec<Proposal>,
    pub generated_at: DateTime<Utc>,
}

/// Analyze a window of records. `None` when there is nothing to analyze.
pub fn analyze(records: &[&ExecutionRecord]) -> Option<AnalysisReport> {
    if records.is_empty() {
        return None;
    }

    let n = records.len() as f64;
    let success_rate = records.iter().filter(|r| r.success).count() as f64 / n;
    let average_duration_ms = records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / n;

    let mut proposals = Vec::new();
    if success_rate < SUCCESS_RATE_FLOOR {
        proposals.push(Proposal {
            kind: ProposalKind::IncreaseRetryAttempts,
            reason: format!(
                "success rate {:.0}% over the last {} tasks is below {:.0}%",
                success_rate * 100.0,
                records.len(),
                SUCCESS_RATE_FLOOR * 100.0
            ),
            observed: success_rate,
            threshold: SUCCESS_RATE_FLOOR,
        });
    }
    if average_duration_ms > DURATION_CEILING_MS {
        proposals.push(Proposal {
            kind: ProposalKind::OptimizeAgentSelection,
            reason: format!(
                "average duration {average_duration_ms:.0}ms exceeds {DURATION_CEILING_MS:.0}ms"
            ),
            observed: average_duration_ms,
            threshold: DURATION_CEILING_MS,
        });
    }

    Some(AnalysisReport {
        window: records.len(),
        success_rate,
        average_duration_ms,
        proposals,
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::history::tests::record;

    #[test]
    fn test_empty_window() {
        assert!(analyze(&[]).is_none());
    }

    #[test]
    fn test_healthy_window_has_no_proposals() {
        let records: Vec<ExecutionRecord> = (0..10).map(|i| record(&i.to_string(), true, 1_000)).collect();
        let refs: Vec<&ExecutionRecord> = records.iter().collect();

        let report = analyze(&refs).unwrap();
        assert_eq!(report.success_rate, 1.0);
        assert!(report.proposals.is_empty());
    }

    #[test]
    fn test_low_success_rate() {
        // 7 of 10 succeed
        let records: Vec<ExecutionRecord> = (0..10)
            .map(|i| record(&i.to_string(), i < 7, 1_000))
            .collect();
        let refs: Vec<&ExecutionRecord> = records.iter().collect();

        let report = analyze(&refs).unwrap();
        assert_eq!(report.proposals.len(), 1);
        assert_eq!(report.proposals[0].kind, ProposalKind::IncreaseRetryAttempts);
    }

    #[test]
    fn test_exact_floor_is_not_low() {
        let records: Vec<ExecutionRecord> = (0..10)
            .map(|i| record(&i.to_string(), i < 8, 1_000))
            .collect();
        let refs: Vec<&ExecutionRecord> = records.iter().collect();
        assert!(analyze(&refs).unwrap().proposals.is_empty());
    }

    #[test]
    fn test_slow_window() {
        let records = [record("a", true, 50_000), record("b", true, 80_000)];
        let refs: Vec<&ExecutionRecord> = records.iter().collect();

        let report = analyze(&refs).unwrap();
        assert_eq!(report.proposals.len(), 1);
        assert_eq!(report.proposals[0].kind, ProposalKind::OptimizeAgentSelection);
        assert_eq!(report.proposals[0].observed, 65_000.0);
    }
}
