//! Batch scheduler

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::analyzers::{
    AnalysisContext, Analyzer, AssertionAnalyzer, DataVariationAnalyzer, EnvironmentAnalyzer,
    GraphqlAnalyzer, HealingDiffAnalyzer, LatencyAnalyzer, SchemaAnalyzer, SecurityAnalyzer,
    TestGenerationAnalyzer,
};
use super::{GenerationTask, ProgressUpdate, TaskKind, TaskOutput, TaskState, Transition};
use crate::config::{Config, GeneratorConfig};
use crate::generator::TestGenerator;
use crate::session::RecordingSession;
use crate::{ApiscopeError, Result};

/// Progress observer, invoked synchronously on every transition
pub type ProgressCallback = dyn Fn(&ProgressUpdate) + Send + Sync;

/// Cooperative cancellation flag
///
/// Checked before each batch. Tasks already running finish; tasks not yet
/// launched stay pending. The flag is cleared when the run ends.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation of the current (or next) run
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Failure of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failed kind
    pub kind: TaskKind,
    /// Error or panic message
    pub message: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Session analyzed
    pub session_id: String,
    /// Final state of every task, in scheduling order
    pub tasks: Vec<GenerationTask>,
    /// Failed tasks
    pub errors: Vec<TaskError>,
    /// Wall time per settled task
    pub timings: BTreeMap<TaskKind, u64>,
    /// Wall time of the whole run
    pub total_ms: u64,
    /// Batches launched
    pub batches: usize,
    /// Whether the run stopped early on a cancel request
    pub cancelled: bool,
}

impl RunResult {
    fn empty(session_id: String) -> Self {
        Self {
            session_id,
            tasks: Vec::new(),
            errors: Vec::new(),
            timings: BTreeMap::new(),
            total_ms: 0,
            batches: 0,
            cancelled: false,
        }
    }

    /// Task of a kind
    #[must_use]
    pub fn task(&self, kind: TaskKind) -> Option<&GenerationTask> {
        self.tasks.iter().find(|t| t.kind == kind)
    }

    /// Artifact of a completed task
    #[must_use]
    pub fn output(&self, kind: TaskKind) -> Option<&TaskOutput> {
        self.task(kind)?.result.as_ref()
    }

    /// Every task completed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Completed)
    }
}

type Outcome = std::result::Result<TaskOutput, String>;

fn millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("analyzer panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("analyzer panicked: {message}")
    } else {
        "analyzer panicked".to_string()
    }
}

/// Schedules analyzers over a session
///
/// Runs on one orchestrator are serialized; the task map is reset at the
/// start of every run and can be read at any time through [`Self::tasks`].
pub struct Orchestrator {
    analyzers: BTreeMap<TaskKind, Arc<dyn Analyzer>>,
    tasks: DashMap<TaskKind, GenerationTask>,
    run_lock: Mutex<()>,
    cancel: CancelHandle,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator without analyzers
    #[must_use]
    pub fn new() -> Self {
        Self {
            analyzers: BTreeMap::new(),
            tasks: DashMap::new(),
            run_lock: Mutex::new(()),
            cancel: CancelHandle::default(),
        }
    }

    /// Orchestrator with every built-in analyzer registered
    ///
    /// ai-test-generation needs an external generator, see
    /// [`Self::with_generator`].
    #[must_use]
    pub fn with_defaults(config: &Config) -> Self {
        Self::new()
            .with_analyzer(Arc::new(SchemaAnalyzer::new(&config.schema, &config.limits)))
            .with_analyzer(Arc::new(GraphqlAnalyzer::new(&config.schema)))
            .with_analyzer(Arc::new(LatencyAnalyzer::new(config.profiler)))
            .with_analyzer(Arc::new(AssertionAnalyzer::default()))
            .with_analyzer(Arc::new(SecurityAnalyzer::default()))
            .with_analyzer(Arc::new(DataVariationAnalyzer::default()))
            .with_analyzer(Arc::new(HealingDiffAnalyzer::new(&config.schema, &config.limits)))
            .with_analyzer(Arc::new(EnvironmentAnalyzer))
    }

    /// Register the ai-test-generation analyzer
    #[must_use]
    pub fn with_generator(self, generator: Arc<dyn TestGenerator>, config: &GeneratorConfig) -> Self {
        self.with_analyzer(Arc::new(TestGenerationAnalyzer::new(generator, config)))
    }

    /// Register an analyzer, replacing any previous one of the same kind
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.register(analyzer);
        self
    }

    /// Register an analyzer, returning the one it replaced
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.insert(analyzer.kind(), analyzer)
    }

    /// Kinds with a registered analyzer
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        self.analyzers.keys().copied().collect()
    }

    /// Handle for cancelling runs from another task
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Snapshot of the current run's tasks in scheduling order
    #[must_use]
    pub fn tasks(&self) -> Vec<GenerationTask> {
        let mut tasks: Vec<GenerationTask> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by_key(|t| t.kind);
        tasks
    }

    /// Run the enabled analyzers over a session
    ///
    /// # Errors
    ///
    /// Returns error before scheduling anything if `limit` is zero or an
    /// enabled kind has no analyzer. Analyzer failures are reported in the
    /// result instead.
    pub async fn run(
        &self,
        session: Arc<RecordingSession>,
        enabled: &[TaskKind],
        limit: usize,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RunResult> {
        self.run_with_context(AnalysisContext::new(session), enabled, limit, on_progress)
            .await
    }

    /// Run with a context carrying a baseline or reference schema
    ///
    /// # Errors
    ///
    /// See [`Self::run`]
    pub async fn run_with_context(
        &self,
        context: AnalysisContext,
        enabled: &[TaskKind],
        limit: usize,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RunResult> {
        if limit == 0 {
            return Err(ApiscopeError::InvalidConcurrency(limit));
        }

        let kinds: BTreeSet<TaskKind> = enabled.iter().copied().collect();
        let mut scheduled: Vec<(TaskKind, Arc<dyn Analyzer>)> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let analyzer = self
                .analyzers
                .get(&kind)
                .ok_or(ApiscopeError::AnalyzerMissing(kind))?;
            scheduled.push((kind, Arc::clone(analyzer)));
        }

        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        let context = Arc::new(context);
        let mut result = RunResult::empty(context.session.id.clone());

        self.tasks.clear();
        for (kind, _) in &scheduled {
            self.tasks
                .insert(*kind, GenerationTask::pending(&result.session_id, *kind));
        }

        if scheduled.is_empty() {
            self.cancel.reset();
            debug!("No tasks enabled for session '{}'", result.session_id);
            return Ok(result);
        }

        info!(
            "Starting run for session '{}': {} tasks, concurrency {}",
            result.session_id,
            scheduled.len(),
            limit
        );

        for batch in scheduled.chunks(limit) {
            if self.cancel.is_cancelled() {
                info!(
                    "Run for session '{}' cancelled after {} batches",
                    result.session_id, result.batches
                );
                result.cancelled = true;
                break;
            }
            result.batches += 1;
            debug!(
                "Batch {}: {:?}",
                result.batches,
                batch.iter().map(|(kind, _)| kind.as_str()).collect::<Vec<_>>()
            );

            let mut set = JoinSet::new();
            let mut unsettled = BTreeSet::new();
            for (kind, analyzer) in batch {
                let (kind, analyzer) = (*kind, Arc::clone(analyzer));
                let context = Arc::clone(&context);
                unsettled.insert(kind);
                self.update(kind, TaskState::Running, on_progress, |_| {});

                set.spawn(async move {
                    let started = Instant::now();
                    let outcome: Outcome = match AssertUnwindSafe(analyzer.analyze(context))
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(payload) => Err(panic_message(payload.as_ref())),
                    };
                    (kind, outcome, millis(started))
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((kind, outcome, elapsed)) => {
                        unsettled.remove(&kind);
                        self.settle(kind, outcome, elapsed, &mut result, on_progress);
                    }
                    Err(e) => warn!("Analyzer task did not complete: {}", e),
                }
            }
            for kind in unsettled {
                self.settle(
                    kind,
                    Err("analyzer task aborted".to_string()),
                    0,
                    &mut result,
                    on_progress,
                );
            }
        }

        self.cancel.reset();
        result.total_ms = millis(started);
        result.tasks = self.tasks();

        info!(
            "Run for session '{}' finished in {}ms: {} completed, {} failed, {} batches",
            result.session_id,
            result.total_ms,
            result
                .tasks
                .iter()
                .filter(|t| t.state == TaskState::Completed)
                .count(),
            result.errors.len(),
            result.batches
        );
        Ok(result)
    }

    fn settle(
        &self,
        kind: TaskKind,
        outcome: Outcome,
        elapsed: u64,
        result: &mut RunResult,
        on_progress: Option<&ProgressCallback>,
    ) {
        result.timings.insert(kind, elapsed);
        match outcome {
            Ok(output) => self.update(kind, TaskState::Completed, on_progress, |task| {
                task.result = Some(output);
                task.duration_ms = Some(elapsed);
            }),
            Err(message) => {
                warn!("Task {} failed: {}", kind, message);
                result.errors.push(TaskError {
                    kind,
                    message: message.clone(),
                });
                self.update(kind, TaskState::Failed, on_progress, |task| {
                    task.error = Some(message);
                    task.duration_ms = Some(elapsed);
                });
            }
        }
    }

    fn update(
        &self,
        kind: TaskKind,
        to: TaskState,
        on_progress: Option<&ProgressCallback>,
        apply: impl FnOnce(&mut GenerationTask),
    ) {
        // the entry guard must be released before the map is read again
        let from = {
            let Some(mut task) = self.tasks.get_mut(&kind) else {
                return;
            };
            let from = task.state;
            task.set_state(to);
            apply(&mut *task);
            from
        };
        debug!("Task {}: {:?} -> {:?}", kind, from, to);

        if let Some(callback) = on_progress {
            let snapshot = self.tasks();
            callback(&ProgressUpdate::from_tasks(
                &snapshot,
                Transition { kind, from, to },
            ));
        }
    }
}
