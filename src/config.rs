//! Configuration types for Apiscope

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::TaskKind;
use crate::schema::MergeStrategy;
use crate::{ApiscopeError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Schema inference settings
    #[serde(default)]
    pub schema: SchemaConfig,
    /// Latency profiler settings
    #[serde(default)]
    pub profiler: ProfilerConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Test generator settings
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Baseline storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of analyzers running at once
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
    /// Task kinds to run
    #[serde(default = "default_enabled_tasks")]
    pub enabled_tasks: Vec<TaskKind>,
}

fn default_concurrency() -> usize {
    3
}

fn default_enabled_tasks() -> Vec<TaskKind> {
    vec![
        TaskKind::SchemaExtraction,
        TaskKind::GraphqlInference,
        TaskKind::LatencyProfiling,
        TaskKind::AssertionSuggestion,
        TaskKind::SecuritySuggestion,
        TaskKind::DataVariation,
        TaskKind::EnvironmentExtraction,
    ]
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency(),
            enabled_tasks: default_enabled_tasks(),
        }
    }
}

/// Schema inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// How to merge samples whose kinds disagree
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Maximum nesting depth followed by inference
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Reference schema document for the auto-healing diff
    #[serde(default)]
    pub reference_schema: Option<PathBuf>,
}

fn default_max_depth() -> usize {
    32
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            merge_strategy: MergeStrategy::default(),
            max_depth: default_max_depth(),
            reference_schema: None,
        }
    }
}

/// Latency profiler configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Soft bound multiplier applied to p95
    pub soft_factor: f64,
    /// Hard bound multiplier applied to max
    pub hard_factor: f64,
    /// Critical endpoint multiplier applied to p99
    pub critical_factor: f64,
    /// Regression multiplier applied to the baseline p95
    pub regression_factor: f64,
    /// p95 above this many milliseconds is reported as slow
    pub slow_threshold_ms: f64,
    /// Fewer samples than this produces a recommendation
    pub min_samples: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            soft_factor: 1.2,
            hard_factor: 1.5,
            critical_factor: 1.1,
            regression_factor: 1.2,
            slow_threshold_ms: 1000.0,
            min_samples: 5,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bodies larger than this (serialized bytes) are skipped by inference
    pub max_body_size: usize,
    /// Maximum exchanges accepted in one session
    pub max_exchanges: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 4 * 1024 * 1024, // 4 MB
            max_exchanges: 100_000,
        }
    }
}

/// Test generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Target test framework passed to the generator
    pub framework: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            framework: "playwright".to_string(),
        }
    }
}

/// Baseline storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for file-backed baselines
    #[serde(default)]
    pub baseline_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApiscopeError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ApiscopeError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.concurrency_limit == 0 {
            return Err(ApiscopeError::ConfigError(
                "orchestrator.concurrency_limit must be >= 1".to_string(),
            ));
        }

        if self.schema.max_depth == 0 {
            return Err(ApiscopeError::ConfigError(
                "schema.max_depth must be >= 1".to_string(),
            ));
        }

        let factors = [
            ("soft_factor", self.profiler.soft_factor),
            ("hard_factor", self.profiler.hard_factor),
            ("critical_factor", self.profiler.critical_factor),
            ("regression_factor", self.profiler.regression_factor),
        ];
        for (name, value) in factors {
            if !value.is_finite() || value <= 0.0 {
                return Err(ApiscopeError::ConfigError(format!(
                    "profiler.{name} must be a positive number, got {value}"
                )));
            }
        }

        if let Some(dir) = &self.storage.baseline_dir {
            if !dir.exists() {
                return Err(ApiscopeError::ConfigError(format!(
                    "Baseline directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        if self.limits.max_body_size == 0 || self.limits.max_exchanges == 0 {
            return Err(ApiscopeError::ConfigError(
                "limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            [orchestrator]
            concurrency_limit = 2
            enabled_tasks = ["schema-extraction", "latency-profiling"]

            [schema]
            merge_strategy = "union"

            [profiler]
            soft_factor = 1.3
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.orchestrator.concurrency_limit, 2);
        assert_eq!(
            config.orchestrator.enabled_tasks,
            vec![TaskKind::SchemaExtraction, TaskKind::LatencyProfiling]
        );
        assert_eq!(config.schema.merge_strategy, MergeStrategy::Union);
        assert!((config.profiler.soft_factor - 1.3).abs() < f64::EPSILON);
        assert!((config.profiler.hard_factor - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.orchestrator.concurrency_limit, 3);
        assert_eq!(config.schema.merge_strategy, MergeStrategy::Widen);
        assert_eq!(config.generator.framework, "playwright");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            [orchestrator]
            concurrency_limit = 4

            [limits]
            max_exchanges = 10
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.orchestrator.concurrency_limit, 4);
        assert_eq!(config.limits.max_exchanges, 10);
    }

    #[test]
    fn test_invalid_config_zero_concurrency() {
        let config_toml = r#"
            [orchestrator]
            concurrency_limit = 0
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config_unknown_task() {
        let config_toml = r#"
            [orchestrator]
            enabled_tasks = ["schema-extraction", "mind-reading"]
        "#;

        assert!(toml::from_str::<Config>(config_toml).is_err());
    }

    #[test]
    fn test_invalid_config_negative_factor() {
        let mut config = Config::default();
        config.profiler.regression_factor = -1.0;
        assert!(config.validate().is_err());
    }
}
