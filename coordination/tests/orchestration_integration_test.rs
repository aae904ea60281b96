//! Orchestration integration tests: drive `TaskOrchestrator` and
//! `ExecutionEngine` end to end with scripted agents.
//!
//! Tests verify:
//! - Pipeline failures name the failing stage and agent
//! - Ensembles reconcile only the successful answers
//! - Agent calls time out and leave the agent in `error`
//! - The quality gate retries once with the best domain agent
//! - Collaborative sessions route and reconcile
//! - Shutdown cancels in-flight work
//! - The learning loop sees every finished task

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::consensus::ConsensusAlgorithm;
use coordination::execution::{ConsensusPlan, ExecutionConfig, ExecutionEngine, ExecutionError};
use coordination::registry::{Agent, AgentProfile, AgentRegistry, AgentRequest, AgentStatus};
use coordination::router::{RoutingRule, RoutingRules, TaskAnalyzer};
use coordination::{
    AgentOutput, EventBus, ExecutionStrategy, OrchestratorConfig, OrchestratorEvent,
    StrategyKind, SubmitOptions, Task, TaskOrchestrator,
};
use tokio_util::sync::CancellationToken;

/// Scripted agent: optional delay, then a fixed answer or a fixed error.
struct ScriptedAgent {
    answer: Result<AgentOutput, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn answering(output: AgentOutput) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(output),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn throwing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn sleeping(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(AgentOutput::text("eventually")),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn execute(&self, _request: AgentRequest) -> anyhow::Result<AgentOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone().map_err(anyhow::Error::msg)
    }
}

fn registry_with(agents: &[(&str, Arc<ScriptedAgent>)]) -> Arc<AgentRegistry> {
    let registry = AgentRegistry::new();
    for (id, agent) in agents {
        registry
            .register(AgentProfile::new(*id), Arc::clone(agent) as Arc<dyn Agent>)
            .unwrap();
    }
    registry.shared()
}

/// Six neutral requirements push complexity to 0.7 (ensemble territory).
fn ensemble_task(description: &str) -> Task {
    Task::new(description).with_requirements((0..6).map(|i| format!("r{i}")))
}

// ── Scenario D: pipeline stage failure ──────────────────────────────

#[tokio::test]
async fn scenario_d_pipeline_stage_failure() {
    let agent_a = ScriptedAgent::answering(AgentOutput::text("parsed"));
    let agent_b = ScriptedAgent::throwing("Invalid input");
    let registry = registry_with(&[("agentA", agent_a.clone()), ("agentB", agent_b.clone())]);
    let rules = RoutingRules::default()
        .with_rule("backend", RoutingRule::new(["agentA", "agentB"]));
    let orchestrator = TaskOrchestrator::new(registry, rules, OrchestratorConfig::default());

    let result = orchestrator
        .submit_task(Task::new("update the api handler"))
        .await;

    assert!(!result.success);
    assert!(result.result.is_none());
    assert_eq!(result.strategy_used, StrategyKind::Pipeline);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "pipeline_stage");
    assert!(error.message.contains("agentB"), "{}", error.message);
    assert!(error.message.contains("stage 1"), "{}", error.message);
    assert!(error.message.contains("Invalid input"), "{}", error.message);
    assert_eq!(agent_a.calls(), 1);
    assert_eq!(agent_b.calls(), 1);
}

// ── Scenario E: ensemble with failures ──────────────────────────────

fn engine_over(registry: Arc<AgentRegistry>) -> ExecutionEngine {
    ExecutionEngine::new(
        registry,
        EventBus::new().shared(),
        ExecutionConfig {
            agent_timeout: Duration::from_secs(5),
            quality_gate: false,
        },
    )
}

#[tokio::test]
async fn scenario_e_ensemble_uses_successful_results() {
    let registry = registry_with(&[
        ("a1", ScriptedAgent::answering(AgentOutput::numeric(10.0).with_confidence(0.7))),
        ("a2", ScriptedAgent::throwing("model offline")),
        ("a3", ScriptedAgent::answering(AgentOutput::numeric(12.0).with_confidence(0.9))),
    ]);
    let engine = engine_over(registry);
    let task = Task::new("estimate effort");
    let profile = TaskAnalyzer::new().analyze(&task);
    let strategy = ExecutionStrategy::Ensemble {
        agents: vec!["a1".into(), "a2".into(), "a3".into()],
    };

    let outcome = engine
        .execute(
            &strategy,
            task.shared(),
            &profile,
            &ConsensusPlan::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let consensus = outcome.consensus.unwrap();
    assert_eq!(consensus.participants(), 2);
    assert_eq!(consensus.failed(), 1);
    assert_eq!(consensus.algorithm, ConsensusAlgorithm::ConfidenceBased);
    assert_eq!(outcome.output.value, Some(12.0));
}

#[tokio::test]
async fn scenario_e_ensemble_all_fail() {
    let registry = registry_with(&[
        ("a1", ScriptedAgent::throwing("crash")),
        ("a2", ScriptedAgent::throwing("crash")),
    ]);
    let engine = engine_over(registry);
    let task = Task::new("estimate effort");
    let profile = TaskAnalyzer::new().analyze(&task);
    let strategy = ExecutionStrategy::Ensemble {
        agents: vec!["a1".into(), "a2".into()],
    };

    let err = engine
        .execute(
            &strategy,
            task.shared(),
            &profile,
            &ConsensusPlan::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::ConsensusInsufficientData { attempted: 2 }));
    assert_eq!(err.kind(), "consensus_insufficient_data");
}

#[tokio::test]
async fn routed_ensemble_with_caller_algorithm() {
    let registry = registry_with(&[
        ("api-1", ScriptedAgent::answering(AgentOutput::numeric(4.0).with_confidence(0.9))),
        ("api-2", ScriptedAgent::answering(AgentOutput::numeric(4.0).with_confidence(0.6))),
        ("api-3", ScriptedAgent::answering(AgentOutput::numeric(9.0))),
    ]);
    let rules = RoutingRules::default()
        .with_rule("backend", RoutingRule::new(["api-1", "api-2", "api-3"]));
    let orchestrator = TaskOrchestrator::new(registry, rules, OrchestratorConfig::default());

    let result = orchestrator
        .submit_task_with(
            ensemble_task("tune the api rate limits"),
            SubmitOptions::default().with_algorithm(ConsensusAlgorithm::MajorityVote),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.strategy_used, StrategyKind::Ensemble);
    // ensembles take at most two preferred agents
    assert_eq!(result.agents_involved, vec!["api-1", "api-2"]);
    let consensus = result.consensus.unwrap();
    assert_eq!(consensus.algorithm, ConsensusAlgorithm::MajorityVote);
    assert_eq!(consensus.confidence, 1.0);
    assert_eq!(result.result.unwrap().value, Some(4.0));
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_agent_times_out() {
    let slow = ScriptedAgent::sleeping(Duration::from_secs(60));
    let registry = registry_with(&[("generalist", slow.clone())]);
    let orchestrator = TaskOrchestrator::new(
        Arc::clone(&registry),
        RoutingRules::default(),
        OrchestratorConfig::default().with_agent_timeout_ms(100),
    );

    let result = orchestrator.submit_task(Task::new("say hello")).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "agent_timeout");
    assert!(error.message.contains("100ms"), "{}", error.message);

    let snapshot = registry.get("generalist").unwrap();
    assert_eq!(snapshot.status, AgentStatus::Error);
    assert_eq!(snapshot.performance.tasks_failed, 1);
    assert!(snapshot.current_task_id.is_none());
}

/// Hands its cancellation token to background work, then never answers
struct CooperativeAgent {
    cancelled: Arc<AtomicUsize>,
}

#[async_trait]
impl Agent for CooperativeAgent {
    async fn execute(&self, request: AgentRequest) -> anyhow::Result<AgentOutput> {
        let token = request.cancel.clone();
        let cancelled = Arc::clone(&self.cancelled);
        tokio::spawn(async move {
            token.cancelled().await;
            cancelled.fetch_add(1, Ordering::SeqCst);
        });
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_the_agent_call() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let registry = AgentRegistry::new();
    registry
        .register(
            AgentProfile::new("waiter"),
            Arc::new(CooperativeAgent {
                cancelled: Arc::clone(&cancelled),
            }) as Arc<dyn Agent>,
        )
        .unwrap();
    let engine = ExecutionEngine::new(
        registry.shared(),
        EventBus::new().shared(),
        ExecutionConfig {
            agent_timeout: Duration::from_millis(50),
            quality_gate: false,
        },
    );
    let task = Task::new("wait");
    let profile = TaskAnalyzer::new().analyze(&task);
    let parent = CancellationToken::new();

    let err = engine
        .execute(
            &ExecutionStrategy::SingleAgent {
                agent: "waiter".into(),
            },
            task.shared(),
            &profile,
            &ConsensusPlan::default(),
            &parent,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::AgentTimeout { timeout_ms: 50, .. }));

    // background work watching the call's token sees the cancellation
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert!(!parent.is_cancelled());
}

// ── Quality gate ────────────────────────────────────────────────────

#[tokio::test]
async fn quality_gate_retries_with_domain_specialist() {
    let flawed = || {
        AgentOutput::text("half done")
            .with_error("ran out of context")
            .with_confidence(0.9)
    };
    let reviewer = ScriptedAgent::answering(AgentOutput::text("complete answer"));
    let registry = AgentRegistry::new();
    for id in ["draft-1", "draft-2"] {
        registry
            .register(AgentProfile::new(id), ScriptedAgent::answering(flawed()) as Arc<dyn Agent>)
            .unwrap();
    }
    registry
        .register(
            AgentProfile::new("reviewer").with_specialty("backend"),
            reviewer.clone() as Arc<dyn Agent>,
        )
        .unwrap();
    let rules = RoutingRules::default()
        .with_rule("backend", RoutingRule::new(["draft-1", "draft-2"]));
    let orchestrator = TaskOrchestrator::new(registry.shared(), rules, OrchestratorConfig::default());
    let mut events = orchestrator.event_bus().subscribe();

    let result = orchestrator
        .submit_task(ensemble_task("tune the api rate limits"))
        .await;

    assert!(result.success);
    assert!(result.quality_retry);
    assert_eq!(reviewer.calls(), 1);
    assert_eq!(result.result.unwrap().output.as_deref(), Some("complete answer"));
    assert_eq!(result.agents_involved, vec!["draft-1", "draft-2", "reviewer"]);

    let mut saw_retry = false;
    while let Ok(event) = events.try_recv() {
        if let OrchestratorEvent::QualityRetry { agent_id, substituted, .. } = event {
            assert_eq!(agent_id, "reviewer");
            assert!(substituted);
            saw_retry = true;
        }
    }
    assert!(saw_retry);
}

#[tokio::test]
async fn quality_gate_can_be_disabled() {
    let flawed = AgentOutput::text("half done").with_error("partial");
    let registry = registry_with(&[
        ("draft-1", ScriptedAgent::answering(flawed.clone())),
        ("draft-2", ScriptedAgent::answering(flawed.clone())),
    ]);
    let rules = RoutingRules::default()
        .with_rule("backend", RoutingRule::new(["draft-1", "draft-2"]));
    let orchestrator = TaskOrchestrator::new(
        registry,
        rules,
        OrchestratorConfig::default().with_quality_gate(false),
    );

    let result = orchestrator
        .submit_task(ensemble_task("tune the api rate limits"))
        .await;
    assert!(result.success);
    assert!(!result.quality_retry);
    assert_eq!(result.result.unwrap(), flawed);
}

// ── Collaborative sessions ──────────────────────────────────────────

#[tokio::test]
async fn collaborative_session_for_cross_cutting_task() {
    let registry = registry_with(&[
        ("ops-1", ScriptedAgent::answering(AgentOutput::numeric(3.0).with_confidence(0.8))),
        ("ops-2", ScriptedAgent::throwing("no capacity")),
        ("ops-3", ScriptedAgent::answering(AgentOutput::numeric(3.0).with_confidence(0.95))),
        ("ops-4", ScriptedAgent::answering(AgentOutput::numeric(7.0))),
    ]);
    let rules = RoutingRules::default()
        .with_rule("devops", RoutingRule::new(["ops-1", "ops-2", "ops-3", "ops-4"]));
    let orchestrator = TaskOrchestrator::new(registry, rules, OrchestratorConfig::default());

    // fix + test + deploy: three capabilities → collaboration
    let result = orchestrator
        .submit_task(Task::new("fix the flaky test and deploy"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.strategy_used, StrategyKind::CollaborativeSession);
    assert_eq!(result.agents_involved, vec!["ops-1", "ops-2", "ops-3"]);
    let consensus = result.consensus.unwrap();
    assert_eq!(consensus.participants, 2);
    assert_eq!(consensus.failed, 1);
    assert_eq!(result.result.unwrap().value, Some(3.0));
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_tasks() {
    let slow = ScriptedAgent::sleeping(Duration::from_secs(30));
    let registry = registry_with(&[("generalist", slow)]);
    let orchestrator = Arc::new(TaskOrchestrator::new(
        Arc::clone(&registry),
        RoutingRules::default(),
        OrchestratorConfig::default(),
    ));

    let pending = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.submit_task(Task::new("long job")).await }
    });
    while orchestrator.active_tasks().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(
        registry.get("generalist").unwrap().status,
        AgentStatus::Busy
    );

    orchestrator.shutdown().await;
    let result = pending.await.unwrap();

    assert_eq!(result.error.unwrap().kind, "cancelled");
    let snapshot = registry.get("generalist").unwrap();
    assert_eq!(snapshot.status, AgentStatus::Idle);
    assert_eq!(snapshot.performance.tasks_failed, 0);
    assert!(orchestrator.active_tasks().is_empty());
}

// ── Learning loop ───────────────────────────────────────────────────

#[tokio::test]
async fn learning_loop_records_every_task() {
    let registry = registry_with(&[
        ("generalist", ScriptedAgent::answering(AgentOutput::text("ok"))),
        ("broken", ScriptedAgent::throwing("nope")),
    ]);
    let rules = RoutingRules::default().with_rule("backend", RoutingRule::new(["broken"]));
    let orchestrator = TaskOrchestrator::new(registry, rules, OrchestratorConfig::default())
        .with_learning();

    for _ in 0..3 {
        orchestrator.submit_task(Task::new("say hello")).await;
    }
    orchestrator.submit_task(Task::new("fix the api")).await;

    let learning = orchestrator.learning().unwrap();
    learning.flush().await;
    let snapshot = learning.snapshot();
    assert_eq!(snapshot.records, 4);

    let report = learning.analyze_now().unwrap();
    assert_eq!(report.window, 4);
    assert!((report.success_rate - 0.75).abs() < 1e-9);
    assert_eq!(report.proposals.len(), 1);

    let records = learning.recent_records(1);
    assert_eq!(records[0].domain, "backend");
    assert!(!records[0].success);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn zero_learning_interval_still_records() {
    let registry = registry_with(&[(
        "generalist",
        ScriptedAgent::answering(AgentOutput::text("ok")),
    )]);
    let config = OrchestratorConfig::default().with_learning_interval_ms(0);
    let orchestrator =
        TaskOrchestrator::new(registry, RoutingRules::default(), config).with_learning();

    let result = orchestrator.submit_task(Task::new("say hello")).await;
    assert!(result.success);

    let learning = orchestrator.learning().unwrap();
    learning.flush().await;
    assert_eq!(learning.snapshot().records, 1);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn learning_cycle_publishes_proposals() {
    let registry = registry_with(&[("generalist", ScriptedAgent::throwing("down"))]);
    let orchestrator = TaskOrchestrator::new(
        registry,
        RoutingRules::default(),
        OrchestratorConfig::default().with_learning_interval_ms(1_000),
    )
    .with_learning();
    let mut proposals = orchestrator.event_bus().subscribe();

    orchestrator.submit_task(Task::new("say hello")).await;
    orchestrator.learning().unwrap().flush().await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let mut issued = None;
    while let Ok(event) = proposals.try_recv() {
        if let OrchestratorEvent::ProposalsIssued { proposals, .. } = event {
            issued = Some(proposals);
        }
    }
    let issued = issued.expect("no proposals published");
    assert_eq!(issued.len(), 1);
    assert_eq!(
        issued[0].kind,
        coordination::ProposalKind::IncreaseRetryAttempts
    );

    orchestrator.shutdown().await;
}
