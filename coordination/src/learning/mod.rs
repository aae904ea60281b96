//! Learning Loop: execution history and periodic routing proposals
//!
//! # Architecture
//!
//! ```text
//! orchestrator ──record()──▶ mpsc ──▶ worker task ──▶ ExecutionHistory
//!                                        │
//!                                  every interval
//!                                        ▼
//!                              analyze(last N records)
//!                                        │
//!                          ProposalsIssued on the event bus
//! ```
//!
//! Recording never blocks a task: records are queued and applied by the
//! worker. The analysis cycle runs on its own timer regardless of in-flight
//! work.

pub mod analysis;
pub mod history;

pub use analysis::{
    analyze, AnalysisReport, Proposal, ProposalKind, DEFAULT_ANALYSIS_WINDOW,
    DURATION_CEILING_MS, SUCCESS_RATE_FLOOR,
};
pub use history::{
    ExecutionHistory, ExecutionRecord, StatsKey, TaskStats, DEFAULT_HISTORY_CAPACITY,
};

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::events::{OrchestratorEvent, SharedEventBus};

/// Shortest analysis interval the worker will tick at
pub const MIN_LEARNING_INTERVAL: Duration = Duration::from_millis(1);

/// Learning loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct LearningConfig {
    pub interval: Duration,
    pub capacity: usize,
    pub window: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300_000),
            capacity: DEFAULT_HISTORY_CAPACITY,
            window: DEFAULT_ANALYSIS_WINDOW,
        }
    }
}

impl From<&OrchestratorConfig> for LearningConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            interval: config.learning_interval(),
            capacity: config.history_capacity,
            window: config.analysis_window,
        }
    }
}

/// Point-in-time view of what the loop has learned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    pub records: usize,
    pub stats: Vec<(StatsKey, TaskStats)>,
    pub latest_report: Option<AnalysisReport>,
}

enum LearningMessage {
    Record(Box<ExecutionRecord>),
    Flush(oneshot::Sender<()>),
}

type SharedHistory = Arc<RwLock<ExecutionHistory>>;
type SharedReport = Arc<RwLock<Option<AnalysisReport>>>;

/// Handle to the background learning worker
pub struct LearningLoop {
    sender: mpsc::UnboundedSender<LearningMessage>,
    history: SharedHistory,
    latest: SharedReport,
    window: usize,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LearningLoop {
    /// Start the worker on the current Tokio runtime
    pub fn spawn(config: LearningConfig, event_bus: SharedEventBus) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let history: SharedHistory = Arc::new(RwLock::new(ExecutionHistory::new(config.capacity)));
        let latest: SharedReport = Arc::new(RwLock::new(None));
        let cancel = CancellationToken::new();
        let interval = config.interval.max(MIN_LEARNING_INTERVAL);

        info!(
            interval_ms = interval.as_millis() as u64,
            capacity = config.capacity,
            window = config.window,
            "Starting learning loop"
        );

        let worker = Worker {
            receiver,
            history: Arc::clone(&history),
            latest: Arc::clone(&latest),
            event_bus,
            cancel: cancel.clone(),
            interval,
            window: config.window,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            sender,
            history,
            latest,
            window: config.window,
            cancel,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a record. Returns false once the worker has stopped.
    pub fn record(&self, record: ExecutionRecord) -> bool {
        self.sender
            .send(LearningMessage::Record(Box::new(record)))
            .is_ok()
    }

    /// Wait until every record queued so far has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(LearningMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn snapshot(&self) -> LearningSnapshot {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        LearningSnapshot {
            records: history.len(),
            stats: history.all_stats(),
            latest_report: self.latest_report(),
        }
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent_records(&self, n: usize) -> Vec<ExecutionRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(n)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Latest analysis produced by the periodic cycle
    pub fn latest_report(&self) -> Option<AnalysisReport> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run an analysis now over the current window, without publishing
    pub fn analyze_now(&self) -> Option<AnalysisReport> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        analyze(&history.recent(self.window))
    }

    /// Stop the worker after it applies already-queued records
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Learning worker ended abnormally");
            }
        }
    }
}

impl Drop for LearningLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    receiver: mpsc::UnboundedReceiver<LearningMessage>,
    history: SharedHistory,
    latest: SharedReport,
    event_bus: SharedEventBus,
    cancel: CancellationToken,
    interval: Duration,
    window: usize,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.drain();
                    break;
                }
                message = self.receiver.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                _ = ticker.tick() => self.cycle(),
            }
        }
        debug!("Learning loop stopped");
    }

    fn handle(&mut self, message: LearningMessage) {
        match message {
            LearningMessage::Record(record) => {
                debug!(task_id = %record.task_id, success = record.success, "Recording execution");
                self.history
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(*record);
            }
            LearningMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            self.handle(message);
        }
    }

    fn cycle(&mut self) {
        let report = {
            let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
            analyze(&history.recent(self.window))
        };
        let Some(report) = report else {
            debug!("Learning cycle skipped: no executions recorded");
            return;
        };

        info!(
            window = report.window,
            success_rate = report.success_rate,
            average_duration_ms = report.average_duration_ms,
            proposals = report.proposals.len(),
            "Learning cycle complete"
        );

        if !report.proposals.is_empty() {
            self.event_bus.publish(OrchestratorEvent::ProposalsIssued {
                proposals: report.proposals.clone(),
                window: report.window,
                timestamp: Utc::now(),
            });
        }
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }
}
