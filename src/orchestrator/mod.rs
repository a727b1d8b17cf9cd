//! Parallel analysis orchestration
//!
//! A run fans a frozen session out to the registered analyzers. Enabled kinds
//! are ordered by [`TaskKind::ALL`] and chunked into batches no larger than
//! the concurrency limit; batches run one after another and the tasks of a
//! batch run concurrently. Every state transition updates the run's task map
//! and is reported to the progress callback.

mod analyzers;
mod engine;

pub use analyzers::{
    AnalysisContext, Analyzer, AssertionAnalyzer, DataVariationAnalyzer, EnvironmentAnalyzer,
    GraphqlAnalyzer, HealingDiffAnalyzer, LatencyAnalyzer, SchemaAnalyzer, SecurityAnalyzer,
    TestGenerationAnalyzer,
};
pub use engine::{CancelHandle, Orchestrator, ProgressCallback, RunResult, TaskError};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointKey;
use crate::environment::EnvironmentProfile;
use crate::generator::GeneratedTests;
use crate::heuristics::Suggestion;
use crate::latency::{Comparison, PerformanceProfile};
use crate::schema::{GraphqlDocument, SchemaDiff, SchemaDocument};
use crate::ApiscopeError;

/// Analysis kinds, in scheduling order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// OpenAPI-style schema document
    SchemaExtraction,
    /// GraphQL schema document
    GraphqlInference,
    /// Latency percentiles and thresholds
    LatencyProfiling,
    /// Response assertions
    AssertionSuggestion,
    /// Security test suggestions
    SecuritySuggestion,
    /// Input variations
    DataVariation,
    /// Diff against a reference schema
    AutoHealingDiff,
    /// Base URLs, credentials and common headers
    EnvironmentExtraction,
    /// External test generation
    AiTestGeneration,
}

impl TaskKind {
    /// Every kind in scheduling order
    pub const ALL: [TaskKind; 9] = [
        TaskKind::SchemaExtraction,
        TaskKind::GraphqlInference,
        TaskKind::LatencyProfiling,
        TaskKind::AssertionSuggestion,
        TaskKind::SecuritySuggestion,
        TaskKind::DataVariation,
        TaskKind::AutoHealingDiff,
        TaskKind::EnvironmentExtraction,
        TaskKind::AiTestGeneration,
    ];

    /// Kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaExtraction => "schema-extraction",
            Self::GraphqlInference => "graphql-inference",
            Self::LatencyProfiling => "latency-profiling",
            Self::AssertionSuggestion => "assertion-suggestion",
            Self::SecuritySuggestion => "security-suggestion",
            Self::DataVariation => "data-variation",
            Self::AutoHealingDiff => "auto-healing-diff",
            Self::EnvironmentExtraction => "environment-extraction",
            Self::AiTestGeneration => "ai-test-generation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ApiscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ApiscopeError::UnknownTaskKind(name.to_string()))
    }
}

/// Lifecycle of a task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Not started
    Pending,
    /// Analyzer in flight
    Running,
    /// Analyzer returned a result
    Completed,
    /// Analyzer returned an error or panicked
    Failed,
}

impl TaskState {
    /// Progress contribution of a task in this state
    #[must_use]
    pub fn progress(self) -> u8 {
        match self {
            Self::Completed => 100,
            Self::Pending | Self::Running | Self::Failed => 0,
        }
    }
}

/// Artifact produced by one analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum TaskOutput {
    /// OpenAPI-style schema document
    Schema(SchemaDocument),
    /// GraphQL document
    Graphql(GraphqlDocument),
    /// Latency profile, plus a baseline comparison when one was supplied
    Performance {
        /// Per-endpoint profile
        profile: PerformanceProfile,
        /// Comparison with the supplied baseline
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comparison: Option<BTreeMap<EndpointKey, Comparison>>,
    },
    /// Heuristic suggestions per endpoint
    Suggestions(BTreeMap<EndpointKey, Vec<Suggestion>>),
    /// Changes against the reference schema
    Diff(SchemaDiff),
    /// Environment for generated tests
    Environment(EnvironmentProfile),
    /// Externally generated tests
    Tests(GeneratedTests),
}

/// One analysis task of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    /// Task id (`<session id>:<kind>`)
    pub id: String,
    /// Analysis kind
    pub kind: TaskKind,
    /// Current state
    pub state: TaskState,
    /// Progress in `[0, 100]`
    pub progress: u8,
    /// Artifact of a completed task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskOutput>,
    /// Error message of a failed task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time of a settled task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl GenerationTask {
    /// Create a pending task
    #[must_use]
    pub fn pending(session_id: &str, kind: TaskKind) -> Self {
        Self {
            id: format!("{session_id}:{kind}"),
            kind,
            state: TaskState::Pending,
            progress: 0,
            result: None,
            error: None,
            duration_ms: None,
        }
    }

    /// Move to a new state, keeping progress consistent
    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
        self.progress = state.progress();
    }
}

/// State change reported with a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Task that changed
    pub kind: TaskKind,
    /// Previous state
    pub from: TaskState,
    /// New state
    pub to: TaskState,
}

/// Aggregate progress after a transition
///
/// Kind lists follow scheduling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Unweighted mean of all task progress values
    pub overall: f64,
    /// Kinds in flight
    pub running: Vec<TaskKind>,
    /// Kinds completed
    pub completed: Vec<TaskKind>,
    /// Kinds failed
    pub failed: Vec<TaskKind>,
    /// Kinds not yet started
    pub pending: Vec<TaskKind>,
    /// Transition that triggered the update
    pub transition: Transition,
}

impl ProgressUpdate {
    /// Aggregate a set of tasks
    #[must_use]
    pub fn from_tasks<'a, I>(tasks: I, transition: Transition) -> Self
    where
        I: IntoIterator<Item = &'a GenerationTask>,
    {
        let mut update = Self {
            overall: 0.0,
            running: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            transition,
        };
        let mut total = 0u64;
        let mut count = 0usize;

        for task in tasks {
            count += 1;
            total += u64::from(task.progress);
            let list = match task.state {
                TaskState::Pending => &mut update.pending,
                TaskState::Running => &mut update.running,
                TaskState::Completed => &mut update.completed,
                TaskState::Failed => &mut update.failed,
            };
            list.push(task.kind);
        }

        for list in [
            &mut update.running,
            &mut update.completed,
            &mut update.failed,
            &mut update.pending,
        ] {
            list.sort();
        }
        if count > 0 {
            update.overall = total as f64 / count as f64;
        }
        update
    }

    /// Total number of tasks in the run
    #[must_use]
    pub fn total(&self) -> usize {
        self.running.len() + self.completed.len() + self.failed.len() + self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_order_and_names() {
        let mut sorted = TaskKind::ALL;
        sorted.sort();
        assert_eq!(sorted, TaskKind::ALL);

        for kind in TaskKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_task_kind() {
        let err = "schema-inference".parse::<TaskKind>().unwrap_err();
        assert!(matches!(err, ApiscopeError::UnknownTaskKind(name) if name == "schema-inference"));
    }

    #[test]
    fn test_progress_mean() {
        let mut tasks: Vec<GenerationTask> = TaskKind::ALL[..4]
            .iter()
            .map(|kind| GenerationTask::pending("s", *kind))
            .collect();
        tasks[0].set_state(TaskState::Completed);
        tasks[1].set_state(TaskState::Failed);
        tasks[2].set_state(TaskState::Running);

        let transition = Transition {
            kind: TaskKind::SchemaExtraction,
            from: TaskState::Running,
            to: TaskState::Completed,
        };
        // reversed input still reports kinds in scheduling order
        tasks.reverse();
        let update = ProgressUpdate::from_tasks(&tasks, transition);
        assert!((update.overall - 25.0).abs() < f64::EPSILON);
        assert_eq!(update.completed, vec![TaskKind::SchemaExtraction]);
        assert_eq!(update.failed, vec![TaskKind::GraphqlInference]);
        assert_eq!(update.running, vec![TaskKind::LatencyProfiling]);
        assert_eq!(update.pending, vec![TaskKind::AssertionSuggestion]);
        assert_eq!(update.total(), 4);
    }

    #[test]
    fn test_task_id() {
        let task = GenerationTask::pending("s1", TaskKind::DataVariation);
        assert_eq!(task.id, "s1:data-variation");
        assert_eq!(task.progress, 0);
    }
}
