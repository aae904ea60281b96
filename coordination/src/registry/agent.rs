//! Agent invocation boundary and per-agent metadata

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::state::types::{AgentId, AgentOutput, Task};

/// Shared context map handed to collaborative-session participants
pub type SharedContext = serde_json::Map<String, serde_json::Value>;

/// An interchangeable worker. The core never looks past this trait.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce an answer for the request.
    ///
    /// Long-running agents should watch `request.cancel`; it fires when the
    /// call times out or the orchestrator shuts down.
    async fn execute(&self, request: AgentRequest) -> anyhow::Result<AgentOutput>;
}

/// Everything an agent receives for one call
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// The task being worked on
    pub task: Arc<Task>,
    /// Previous stage's answer (pipeline) or the answer being improved (quality retry)
    pub previous_result: Option<AgentOutput>,
    /// Session context written so far (collaborative sessions)
    pub shared_context: Option<SharedContext>,
    /// Cooperative cancellation signal for this call
    pub cancel: CancellationToken,
}

impl AgentRequest {
    pub fn new(task: Arc<Task>, cancel: CancellationToken) -> Self {
        Self {
            task,
            previous_result: None,
            shared_context: None,
            cancel,
        }
    }

    pub fn with_previous_result(mut self, previous: Option<AgentOutput>) -> Self {
        self.previous_result = previous;
        self
    }

    pub fn with_shared_context(mut self, context: SharedContext) -> Self {
        self.shared_context = Some(context);
        self
    }
}

/// Static attributes supplied at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    #[serde(default)]
    pub specialties: BTreeSet<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub capabilities: HashMap<String, Vec<String>>,
}

impl AgentProfile {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self {
            id: id.into(),
            specialties: BTreeSet::new(),
            priority: 0,
            capabilities: HashMap::new(),
        }
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialties.insert(specialty.into().to_lowercase());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capability<I, S>(mut self, category: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .insert(category.into(), tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the agent lists `domain` among its specialties (case-insensitive)
    pub fn specializes_in(&self, domain: &str) -> bool {
        self.specialties.contains(&domain.to_lowercase())
    }

    /// Every capability tag across all categories
    pub fn capability_tags(&self) -> BTreeSet<&str> {
        self.capabilities
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// Live status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Running performance counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Rolling mean over successful calls
    pub average_time_ms: f64,
    pub success_rate: f64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            average_time_ms: 0.0,
            success_rate: 1.0,
        }
    }
}

impl AgentPerformance {
    pub fn record_success(&mut self, elapsed_ms: f64) {
        self.tasks_completed += 1;
        let n = self.tasks_completed as f64;
        self.average_time_ms = (self.average_time_ms * (n - 1.0) + elapsed_ms) / n;
        self.refresh_success_rate();
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.refresh_success_rate();
    }

    fn refresh_success_rate(&mut self) {
        let total = self.tasks_completed + self.tasks_failed;
        self.success_rate = if total == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / total as f64
        };
    }
}

/// Point-in-time copy of an agent's registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub profile: AgentProfile,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
    pub performance: AgentPerformance,
    pub last_active: Option<DateTime<Utc>>,
}

impl AgentSnapshot {
    pub fn id(&self) -> &str {
        &self.profile.id
    }
}
