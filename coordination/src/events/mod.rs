//! Typed event bus for cross-component notification
//!
//! Producers (orchestrator, execution engines, learning loop) publish
//! [`OrchestratorEvent`]s; any number of subscribers receive them in
//! publication order.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Orchestrator│────▶│  Event Bus   │────▶│  Subscribers │
//! │  Engines     │     │  (broadcast) │     │   (recv)     │
//! │  Learning    │     └──────────────┘     └──────────────┘
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let bus = EventBus::new().shared();
//! let mut failures = bus.subscribe_filtered(EventFilter::new().types(vec!["task_failed"]));
//!
//! while let Ok(event) = failures.recv().await {
//!     warn!(task_id = ?event.task_id(), "task failed");
//! }
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::OrchestratorEvent;
