//! Config integration tests: loading coordination settings from disk.
//!
//! Tests verify:
//! - A full `[orchestrator]` + `[routing]` file loads and drives routing
//! - Standalone routing files load through `RoutingRules::load`
//! - Missing and malformed files surface the right `ConfigError`
//! - Override sources win over file values, and bad overrides are ignored

use std::io::Write;

use coordination::config::{ENV_AGENT_TIMEOUT_MS, ENV_DEFAULT_ALGORITHM, ENV_MAX_CONCURRENT_TASKS};
use coordination::{
    AdaptiveRouter, ConfigError, ConsensusAlgorithm, CoordinationConfig, ExecutionStrategy,
    OrchestratorConfig, RoutingRules, StrategyKind, Task, TaskAnalyzer,
};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL_CONFIG: &str = r#"
[orchestrator]
max_concurrent_tasks = 4
agent_timeout_ms = 60000
default_algorithm = "majority_vote"
quality_gate = false

[routing]
default_agent = "helper"

[routing.domains.backend]
preferred_agents = ["api-expert", "db-expert"]
fallback_strategy = "pipeline"
"#;

// ── Loading ─────────────────────────────────────────────────────────

#[test]
fn full_config_file_loads() {
    let file = write_config(FULL_CONFIG);
    let config = CoordinationConfig::load(file.path()).unwrap();

    assert_eq!(config.orchestrator.max_concurrent_tasks, 4);
    assert_eq!(config.orchestrator.agent_timeout_ms, 60_000);
    assert_eq!(config.orchestrator.default_algorithm, ConsensusAlgorithm::MajorityVote);
    assert!(!config.orchestrator.quality_gate);
    // unset keys keep their defaults
    assert_eq!(config.orchestrator.history_capacity, 1000);

    assert_eq!(config.routing.default_agent, "helper");
    let backend = config.routing.rule_for("backend");
    assert_eq!(backend.preferred_agents, vec!["api-expert", "db-expert"]);
    assert_eq!(backend.fallback_strategy, StrategyKind::Pipeline);
}

#[test]
fn loaded_rules_drive_routing() {
    let file = write_config(FULL_CONFIG);
    let config = CoordinationConfig::load(file.path()).unwrap();

    let profile = TaskAnalyzer::new().analyze(&Task::new("add an api endpoint"));
    let decision = AdaptiveRouter::new().route(&profile, &config.routing);

    assert_eq!(profile.domain, "backend");
    assert_eq!(
        decision.strategy,
        ExecutionStrategy::Pipeline {
            agents: vec!["api-expert".to_string(), "db-expert".to_string()],
        }
    );
    assert_eq!(decision.fallback_strategy, StrategyKind::Pipeline);
}

#[test]
fn routing_file_loads_on_its_own() {
    let file = write_config(
        r#"
        [domains.Frontend]
        preferred_agents = ["ui-expert"]
        "#,
    );
    let rules = RoutingRules::load(file.path()).unwrap();

    assert_eq!(rules.default_agent, "generalist");
    assert_eq!(rules.rule_for("frontend").preferred_agents, vec!["ui-expert"]);
    assert_eq!(rules.rule_for("database").preferred_agents, vec!["generalist"]);
}

#[test]
fn empty_file_is_all_defaults() {
    let file = write_config("");
    let config = CoordinationConfig::load(file.path()).unwrap();
    assert_eq!(config.routing, RoutingRules::default());
    assert_eq!(config.orchestrator.max_concurrent_tasks, 10);
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = CoordinationConfig::load(&path).unwrap_err();
    match err {
        ConfigError::Read { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected read error, got {other}"),
    }
    assert!(matches!(RoutingRules::load(&path), Err(ConfigError::Read { .. })));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[orchestrator\nmax_concurrent_tasks = ");
    assert!(matches!(
        CoordinationConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn invalid_values_are_rejected() {
    let file = write_config("[orchestrator]\nagent_timeout_ms = 0\n");
    assert!(matches!(
        CoordinationConfig::load(file.path()),
        Err(ConfigError::Invalid(_))
    ));

    let file = write_config("[routing.domains.backend]\npreferred_agents = [\"api\", \" \"]\n");
    let err = CoordinationConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("routing.domains.backend"));
}

// ── Overrides ───────────────────────────────────────────────────────

#[test]
fn overrides_win_over_file_values() {
    let file = write_config(FULL_CONFIG);
    let mut config = CoordinationConfig::load(file.path()).unwrap().orchestrator;

    config.apply_overrides(|key| match key {
        ENV_MAX_CONCURRENT_TASKS => Some(" 2 ".to_string()),
        ENV_DEFAULT_ALGORITHM => Some("weighted_average".to_string()),
        ENV_AGENT_TIMEOUT_MS => Some("soon".to_string()),
        _ => None,
    });

    assert_eq!(config.max_concurrent_tasks, 2);
    assert_eq!(config.default_algorithm, ConsensusAlgorithm::WeightedAverage);
    assert_eq!(config.agent_timeout_ms, 60_000);
    assert!(config.validate().is_ok());
}

#[test]
fn zero_override_fails_validation() {
    let mut config = OrchestratorConfig::default();
    config.apply_overrides(|key| (key == ENV_MAX_CONCURRENT_TASKS).then(|| "0".to_string()));
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}
