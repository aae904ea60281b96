//! Task Router Module
//!
//! Profiles incoming tasks and picks an execution topology:
//!
//! ```text
//! Condition (first match wins)             | Strategy              | Agents
//! -----------------------------------------|-----------------------|---------------------
//! complexity > 0.8 or collaboration needed | CollaborativeSession  | first 3 preferred
//! complexity > 0.6                         | Ensemble              | first 2 preferred
//! more than one preferred agent            | Pipeline              | all preferred, in order
//! otherwise                                | SingleAgent           | first preferred
//! ```
//!
//! Preferred agents come from the per-domain [`RoutingRules`]; a domain with
//! no rule routes to the default generalist agent.

pub mod adaptive;
pub mod analyzer;
pub mod rules;

pub use adaptive::{AdaptiveRouter, RoutingDecision};
pub use analyzer::{TaskAnalyzer, TaskProfile, DEFAULT_DOMAIN};
pub use rules::{RoutingRule, RoutingRules, DEFAULT_AGENT_ID};
