//! Tracing setup and span helpers
//!
//! # Span Hierarchy
//!
//! ```text
//! coordination.task       (one per submitted task)
//!   └─ coordination.agent (one per agent call, retries included)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::telemetry;
//!
//! telemetry::init_tracing("coordination=info");
//! ```

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// One submitted task, routing through result
pub const SPAN_TASK: &str = "coordination.task";

/// One agent call
pub const SPAN_AGENT: &str = "coordination.agent";

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns false when a
/// global subscriber is already set, so calling this twice is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Span for a task; `strategy` is filled in once routing decides
pub fn task_span(task_id: &str, task_type: &str) -> Span {
    tracing::info_span!(
        "coordination.task",
        task.id = task_id,
        task.task_type = task_type,
        strategy = tracing::field::Empty,
    )
}

pub fn record_strategy(span: &Span, strategy: &str) {
    span.record("strategy", strategy);
}

pub fn agent_span(task_id: &str, agent_id: &str) -> Span {
    tracing::debug_span!("coordination.agent", task.id = task_id, agent.id = agent_id)
}
