//! Built-in analyzers, one per task kind

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{TaskKind, TaskOutput};
use crate::config::{GeneratorConfig, LimitsConfig, ProfilerConfig, SchemaConfig};
use crate::environment;
use crate::generator::{GenerationRequest, TestGenerator};
use crate::heuristics::{AssertionBuilder, SecurityBuilder, SuggestionBuilder, VariationBuilder};
use crate::latency::{compare_to_baseline, Baseline, Profiler};
use crate::schema::{diff_documents, GraphqlInferrer, SchemaDocument, SchemaExtractor};
use crate::session::RecordingSession;
use crate::{ApiscopeError, Result};

/// Inputs shared by every analyzer of a run
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Frozen session
    pub session: Arc<RecordingSession>,
    /// Baseline for latency comparison
    pub baseline: Option<Baseline>,
    /// Reference document for the auto-healing diff
    pub reference_schema: Option<SchemaDocument>,
}

impl AnalysisContext {
    /// Context carrying only a session
    #[must_use]
    pub fn new(session: Arc<RecordingSession>) -> Self {
        Self {
            session,
            baseline: None,
            reference_schema: None,
        }
    }

    /// Attach a latency baseline
    #[must_use]
    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Attach a reference schema document
    #[must_use]
    pub fn with_reference_schema(mut self, document: SchemaDocument) -> Self {
        self.reference_schema = Some(document);
        self
    }
}

/// One analysis engine
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Kind this analyzer is registered under
    fn kind(&self) -> TaskKind;

    /// Analyze a session
    ///
    /// # Errors
    ///
    /// Any error fails this task only
    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput>;
}

/// OpenAPI-style schema extraction
pub struct SchemaAnalyzer {
    extractor: SchemaExtractor,
}

impl SchemaAnalyzer {
    /// Create from configuration
    #[must_use]
    pub fn new(schema: &SchemaConfig, limits: &LimitsConfig) -> Self {
        Self {
            extractor: SchemaExtractor::new(schema, limits),
        }
    }
}

#[async_trait]
impl Analyzer for SchemaAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::SchemaExtraction
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        let document = self.extractor.extract(&context.session);
        debug!("Extracted {} operations", document.operation_count());
        Ok(TaskOutput::Schema(document))
    }
}

/// GraphQL schema inference
pub struct GraphqlAnalyzer {
    inferrer: GraphqlInferrer,
}

impl GraphqlAnalyzer {
    /// Create from configuration
    #[must_use]
    pub fn new(schema: &SchemaConfig) -> Self {
        Self {
            inferrer: GraphqlInferrer::new(schema),
        }
    }
}

#[async_trait]
impl Analyzer for GraphqlAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::GraphqlInference
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        Ok(TaskOutput::Graphql(
            self.inferrer.infer_document(&context.session),
        ))
    }
}

/// Latency profiling, with a baseline comparison when one is supplied
pub struct LatencyAnalyzer {
    profiler: Profiler,
}

impl LatencyAnalyzer {
    /// Create from configuration
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        Self {
            profiler: Profiler::new(config),
        }
    }
}

#[async_trait]
impl Analyzer for LatencyAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::LatencyProfiling
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        let profile = self.profiler.profile(&context.session);
        let comparison = context
            .baseline
            .as_ref()
            .map(|baseline| compare_to_baseline(&self.profiler, &context.session, baseline));
        Ok(TaskOutput::Performance {
            profile,
            comparison,
        })
    }
}

/// Runs a heuristic builder over every exchange of the session
fn suggestions(builder: &dyn SuggestionBuilder, context: &AnalysisContext) -> TaskOutput {
    TaskOutput::Suggestions(builder.suggest_all(&context.session.requests))
}

/// Response assertion suggestions
#[derive(Default)]
pub struct AssertionAnalyzer {
    builder: AssertionBuilder,
}

#[async_trait]
impl Analyzer for AssertionAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::AssertionSuggestion
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        Ok(suggestions(&self.builder, &context))
    }
}

/// Security test suggestions
#[derive(Default)]
pub struct SecurityAnalyzer {
    builder: SecurityBuilder,
}

#[async_trait]
impl Analyzer for SecurityAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::SecuritySuggestion
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        Ok(suggestions(&self.builder, &context))
    }
}

/// Input variation suggestions
#[derive(Default)]
pub struct DataVariationAnalyzer {
    builder: VariationBuilder,
}

#[async_trait]
impl Analyzer for DataVariationAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::DataVariation
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        Ok(suggestions(&self.builder, &context))
    }
}

/// Diff of the observed schema against a reference document
pub struct HealingDiffAnalyzer {
    extractor: SchemaExtractor,
}

impl HealingDiffAnalyzer {
    /// Create from configuration
    #[must_use]
    pub fn new(schema: &SchemaConfig, limits: &LimitsConfig) -> Self {
        Self {
            extractor: SchemaExtractor::new(schema, limits),
        }
    }
}

#[async_trait]
impl Analyzer for HealingDiffAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::AutoHealingDiff
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        let reference = context.reference_schema.as_ref().ok_or_else(|| {
            ApiscopeError::MissingInput("auto-healing-diff needs a reference schema".to_string())
        })?;
        let current = self.extractor.extract(&context.session);
        let diff = diff_documents(reference, &current);
        debug!(
            "Schema diff: {} changes, {} breaking",
            diff.changes.len(),
            diff.breaking_changes
        );
        Ok(TaskOutput::Diff(diff))
    }
}

/// Environment extraction
#[derive(Default)]
pub struct EnvironmentAnalyzer;

#[async_trait]
impl Analyzer for EnvironmentAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::EnvironmentExtraction
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        Ok(TaskOutput::Environment(environment::extract(&context.session)))
    }
}

/// Hands the session to the external test generator
pub struct TestGenerationAnalyzer {
    generator: Arc<dyn TestGenerator>,
    framework: String,
}

impl TestGenerationAnalyzer {
    /// Wrap a generator
    #[must_use]
    pub fn new(generator: Arc<dyn TestGenerator>, config: &GeneratorConfig) -> Self {
        Self {
            generator,
            framework: config.framework.clone(),
        }
    }
}

#[async_trait]
impl Analyzer for TestGenerationAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::AiTestGeneration
    }

    async fn analyze(&self, context: Arc<AnalysisContext>) -> Result<TaskOutput> {
        let request = GenerationRequest {
            session: Arc::clone(&context.session),
            framework: self.framework.clone(),
            environment: environment::extract(&context.session),
        };
        let tests = self.generator.generate(request).await?;
        Ok(TaskOutput::Tests(tests))
    }
}
