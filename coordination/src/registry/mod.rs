//! Agent Registry: identity, capability tags, live status and performance
//!
//! The registry is the only mutable state shared between concurrently running
//! tasks. Each agent is guarded three ways:
//!
//! - the id map sits behind an `RwLock` (writes only at registration)
//! - each agent's status and counters sit behind their own `Mutex`
//! - an exclusive async lease serialises tasks on one agent, so `busy`
//!   holds exactly while one task is in flight
//!
//! ```ignore
//! let registry = AgentRegistry::new().shared();
//! registry.register(AgentProfile::new("coder").with_specialty("backend"), Arc::new(coder))?;
//!
//! let lease = registry.lease("coder", &task.id).await?;
//! let output = lease.handle().execute(request).await;
//! lease.settle_success(elapsed_ms);
//! ```

pub mod agent;

pub use agent::{
    Agent, AgentPerformance, AgentProfile, AgentRequest, AgentSnapshot, AgentStatus,
    SharedContext,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::state::types::{AgentId, TaskId};

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentId),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Shared registry handle
pub type SharedAgentRegistry = Arc<AgentRegistry>;

#[derive(Debug, Default)]
struct AgentState {
    status: AgentStatus,
    current_task_id: Option<TaskId>,
    performance: AgentPerformance,
    last_active: Option<DateTime<Utc>>,
}

struct AgentSlot {
    profile: AgentProfile,
    handle: Arc<dyn Agent>,
    state: Mutex<AgentState>,
    lease: Arc<tokio::sync::Mutex<()>>,
}

impl AgentSlot {
    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> AgentSnapshot {
        let state = self.state();
        AgentSnapshot {
            profile: self.profile.clone(),
            status: state.status,
            current_task_id: state.current_task_id.clone(),
            performance: state.performance.clone(),
            last_active: state.last_active,
        }
    }
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<AgentId, Arc<AgentSlot>>,
    order: Vec<AgentId>,
}

/// Registry of all agents, in registration order
#[derive(Default)]
pub struct AgentRegistry {
    slots: RwLock<Slots>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in an `Arc` for injection into the router and engines
    pub fn shared(self) -> SharedAgentRegistry {
        Arc::new(self)
    }

    /// Register an agent. Ids are unique for the lifetime of the registry.
    pub fn register(&self, profile: AgentProfile, handle: Arc<dyn Agent>) -> RegistryResult<()> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.by_id.contains_key(&profile.id) {
            return Err(RegistryError::DuplicateAgent(profile.id));
        }

        info!(
            agent_id = %profile.id,
            specialties = ?profile.specialties,
            priority = profile.priority,
            "Registered agent"
        );

        let id = profile.id.clone();
        slots.by_id.insert(
            id.clone(),
            Arc::new(AgentSlot {
                profile,
                handle,
                state: Mutex::new(AgentState::default()),
                lease: Arc::new(tokio::sync::Mutex::new(())),
            }),
        );
        slots.order.push(id);
        Ok(())
    }

    fn slot(&self, agent_id: &str) -> RegistryResult<Arc<AgentSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.slot(agent_id).is_ok()
    }

    /// Fail with `AgentNotFound` for the first id that is not registered
    pub fn ensure_registered<'a, I>(&self, agent_ids: I) -> RegistryResult<()>
    where
        I: IntoIterator<Item = &'a AgentId>,
    {
        for id in agent_ids {
            self.slot(id)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of one agent
    pub fn get(&self, agent_id: &str) -> RegistryResult<AgentSnapshot> {
        Ok(self.slot(agent_id)?.snapshot())
    }

    /// Current state of every agent, in registration order
    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .order
            .iter()
            .filter_map(|id| slots.by_id.get(id))
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Agents listing `domain` as a specialty, in registration order
    pub fn specialists(&self, domain: &str) -> Vec<AgentSnapshot> {
        self.snapshots()
            .into_iter()
            .filter(|s| s.profile.specializes_in(domain))
            .collect()
    }

    /// Best-performing agent for a domain.
    ///
    /// Considers domain specialists first, every agent otherwise. Ranked by
    /// success rate, then priority, then average time; registration order
    /// breaks remaining ties.
    pub fn best_for_domain(&self, domain: &str) -> Option<AgentId> {
        let mut candidates = self.specialists(domain);
        if candidates.is_empty() {
            candidates = self.snapshots();
        }

        let mut best: Option<&AgentSnapshot> = None;
        for candidate in &candidates {
            let better = match best {
                None => true,
                Some(current) => ranks_above(candidate, current),
            };
            if better {
                best = Some(candidate);
            }
        }

        let best = best.map(|s| s.profile.id.clone());
        debug!(domain, best = ?best, candidates = candidates.len(), "Ranked agents for domain");
        best
    }

    /// Acquire exclusive use of an agent for one task.
    ///
    /// Waits while another task holds the agent. The agent is `busy` until the
    /// returned lease is settled or dropped.
    pub async fn lease(&self, agent_id: &str, task_id: &str) -> RegistryResult<AgentLease> {
        let slot = self.slot(agent_id)?;
        let guard = slot.lease.clone().lock_owned().await;

        {
            let mut state = slot.state();
            state.status = AgentStatus::Busy;
            state.current_task_id = Some(task_id.to_string());
        }
        debug!(agent_id, task_id, "Agent leased");

        Ok(AgentLease {
            slot,
            settled: false,
            _guard: guard,
        })
    }
}

fn ranks_above(a: &AgentSnapshot, b: &AgentSnapshot) -> bool {
    use std::cmp::Ordering;

    let ordering = a
        .performance
        .success_rate
        .partial_cmp(&b.performance.success_rate)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.profile.priority.cmp(&b.profile.priority))
        .then_with(|| {
            // lower average time is better
            b.performance
                .average_time_ms
                .partial_cmp(&a.performance.average_time_ms)
                .unwrap_or(Ordering::Equal)
        });
    ordering == Ordering::Greater
}

/// Exclusive hold on one agent for one task.
///
/// Settle it with the call's outcome. Dropping it unsettled (the task was
/// cancelled mid-call) returns the agent to `idle` without touching counters.
pub struct AgentLease {
    slot: Arc<AgentSlot>,
    settled: bool,
    _guard: OwnedMutexGuard<()>,
}

impl AgentLease {
    pub fn handle(&self) -> Arc<dyn Agent> {
        Arc::clone(&self.slot.handle)
    }

    /// Record a successful call and release the agent as `idle`
    pub fn settle_success(mut self, elapsed_ms: f64) {
        let mut state = self.slot.state();
        state.performance.record_success(elapsed_ms);
        state.status = AgentStatus::Idle;
        state.current_task_id = None;
        state.last_active = Some(Utc::now());
        self.settled = true;
    }

    /// Record a failed call and release the agent in `error`
    pub fn settle_failure(mut self) {
        let mut state = self.slot.state();
        state.performance.record_failure();
        state.status = AgentStatus::Error;
        state.current_task_id = None;
        state.last_active = Some(Utc::now());
        self.settled = true;
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.slot.state();
            state.status = AgentStatus::Idle;
            state.current_task_id = None;
        }
    }
}
