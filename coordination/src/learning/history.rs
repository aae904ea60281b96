//! Bounded execution history with per-(task type, domain) statistics

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::TaskProfile;
use crate::state::types::{StrategyKind, Task, TaskId, TaskResult};

/// Default number of records retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Sanitized record of one finished task. Carries no task text or answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub task_type: String,
    pub domain: String,
    pub complexity: f64,
    pub strategy: StrategyKind,
    pub success: bool,
    pub result_type: Option<String>,
    pub confidence: Option<f64>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn from_result(task: &Task, profile: &TaskProfile, result: &TaskResult) -> Self {
        let answer = result.result.as_ref();
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            domain: profile.domain.clone(),
            complexity: profile.complexity,
            strategy: result.strategy_used,
            success: result.success,
            result_type: answer.and_then(|a| a.result_type.clone()),
            confidence: result
                .consensus
                .as_ref()
                .map(|c| c.confidence)
                .or_else(|| answer.and_then(|a| a.confidence)),
            duration_ms: result.duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Stats key: `(task_type, domain)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatsKey {
    pub task_type: String,
    pub domain: String,
}

impl StatsKey {
    pub fn new(task_type: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            domain: domain.into(),
        }
    }
}

impl std::fmt::Display for StatsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.task_type, self.domain)
    }
}

/// Running statistics for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub count: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub last_updated: DateTime<Utc>,
}

impl TaskStats {
    fn first(record: &ExecutionRecord) -> Self {
        Self {
            count: 1,
            success_rate: if record.success { 1.0 } else { 0.0 },
            average_duration_ms: record.duration_ms as f64,
            last_updated: record.timestamp,
        }
    }

    /// `new = (old × (n − 1) + sample) / n`
    fn update(&mut self, record: &ExecutionRecord) {
        self.count += 1;
        let n = self.count as f64;
        let success = if record.success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (n - 1.0) + success) / n;
        self.average_duration_ms =
            (self.average_duration_ms * (n - 1.0) + record.duration_ms as f64) / n;
        self.last_updated = record.timestamp;
    }
}

/// Ring buffer of records, oldest evicted first.
///
/// Statistics cover every record ever seen, including evicted ones.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    capacity: usize,
    records: VecDeque<ExecutionRecord>,
    stats: HashMap<StatsKey, TaskStats>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            stats: HashMap::new(),
        }
    }

    pub fn record(&mut self, record: ExecutionRecord) {
        let key = StatsKey::new(&record.task_type, &record.domain);
        match self.stats.get_mut(&key) {
            Some(stats) => stats.update(&record),
            None => {
                self.stats.insert(key, TaskStats::first(&record));
            }
        }

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<&ExecutionRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).collect()
    }

    pub fn stats_for(&self, task_type: &str, domain: &str) -> Option<&TaskStats> {
        self.stats.get(&StatsKey::new(task_type, domain))
    }

    /// Every key's statistics, sorted by key
    pub fn all_stats(&self) -> Vec<(StatsKey, TaskStats)> {
        let mut all: Vec<(StatsKey, TaskStats)> = self
            .stats
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
