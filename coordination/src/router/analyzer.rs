//! Task analyzer: derives a routing profile from a raw task.
//!
//! Pure function of the task plus the static keyword tables below.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::types::Task;

/// Domain assigned when no keyword matches
pub const DEFAULT_DOMAIN: &str = "general";

const BASE_COMPLEXITY: f64 = 0.5;
const LONG_DESCRIPTION_CHARS: usize = 500;
const MANY_REQUIREMENTS: usize = 5;
const MANY_CONSTRAINTS: usize = 3;
const BASE_DURATION_MS: f64 = 30_000.0;

/// Ordered domain table. The first domain with a matching keyword wins.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "security",
        &["security", "vulnerab", "authenticat", "authoriz", "encrypt", "exploit"],
    ),
    (
        "frontend",
        &["frontend", "react", "vue", "angular", "css", "html", "user interface"],
    ),
    (
        "backend",
        &["backend", "api", "server", "endpoint", "microservice", "rest"],
    ),
    (
        "database",
        &["database", "sql", "schema", "query", "migration", "index"],
    ),
    (
        "devops",
        &["devops", "deploy", "docker", "kubernetes", "ci/cd", "infrastructure"],
    ),
    ("testing", &["test", "qa", "coverage", "regression"]),
    (
        "data",
        &["data analysis", "machine learning", "analytics", "dataset", "etl"],
    ),
    ("documentation", &["document", "readme", "tutorial", "guide"]),
];

/// Keyword → capability table scanned over description and requirements
const CAPABILITY_KEYWORDS: &[(&str, &str)] = &[
    ("test", "testing"),
    ("deploy", "deployment"),
    ("review", "code_review"),
    ("debug", "debugging"),
    ("fix", "debugging"),
    ("refactor", "refactoring"),
    ("optimiz", "optimization"),
    ("performance", "optimization"),
    ("secur", "security"),
    ("design", "architecture"),
    ("architect", "architecture"),
    ("document", "documentation"),
    ("api", "api_design"),
    ("database", "data_modeling"),
    ("schema", "data_modeling"),
    ("monitor", "observability"),
    ("implement", "implementation"),
];

/// Derived summary consumed by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Estimated complexity (0.0-1.0)
    pub complexity: f64,
    pub domain: String,
    pub required_capabilities: BTreeSet<String>,
    pub estimated_duration_ms: f64,
    pub collaboration_needed: bool,
}

/// Profiles tasks for routing
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, task: &Task) -> TaskProfile {
        let complexity = Self::complexity(task);
        let domain = Self::domain(task);
        let required_capabilities = Self::capabilities(task);

        TaskProfile {
            collaboration_needed: complexity > 0.7 || required_capabilities.len() > 2,
            estimated_duration_ms: BASE_DURATION_MS * (1.0 + 2.0 * complexity),
            complexity,
            domain,
            required_capabilities,
        }
    }

    fn complexity(task: &Task) -> f64 {
        let mut score = BASE_COMPLEXITY;
        if task.description.chars().count() > LONG_DESCRIPTION_CHARS {
            score += 0.2;
        }
        if task.requirements.len() > MANY_REQUIREMENTS {
            score += 0.2;
        }
        if task.constraints.len() > MANY_CONSTRAINTS {
            score += 0.1;
        }
        if !task.dependencies.is_empty() {
            score += 0.1;
        }
        score.min(1.0)
    }

    fn domain(task: &Task) -> String {
        let desc = task.description.to_lowercase();
        let task_type = task.task_type.to_lowercase();

        DOMAIN_KEYWORDS
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|k| desc.contains(k) || task_type.contains(k))
            })
            .map(|(domain, _)| (*domain).to_string())
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string())
    }

    fn capabilities(task: &Task) -> BTreeSet<String> {
        let mut text = task.description.to_lowercase();
        for requirement in &task.requirements {
            text.push(' ');
            text.push_str(&requirement.to_lowercase());
        }

        CAPABILITY_KEYWORDS
            .iter()
            .filter(|(keyword, _)| text.contains(keyword))
            .map(|(_, capability)| (*capability).to_string())
            .collect()
    }
}
