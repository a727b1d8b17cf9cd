//! Boundary to the external test-generation collaborator
//!
//! The code generator itself (a language-model client in practice) lives
//! outside this crate. The ai-test-generation analyzer hands it the frozen
//! session plus the environment extracted from it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentProfile;
use crate::session::RecordingSession;
use crate::Result;

/// Input for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Session to generate tests for
    pub session: Arc<RecordingSession>,
    /// Target framework (`playwright`, `jest`, ...)
    pub framework: String,
    /// Base URLs and variables the generated suite should reference
    pub environment: EnvironmentProfile,
}

/// One generated source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    /// Relative path of the file
    pub path: String,
    /// File contents
    pub content: String,
}

/// Output of a generation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTests {
    /// Framework the files target
    pub framework: String,
    /// Generated files
    pub files: Vec<GeneratedFile>,
}

impl GeneratedTests {
    /// Number of generated files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was generated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// External test generator
#[async_trait]
pub trait TestGenerator: Send + Sync {
    /// Generate a test suite for a session
    ///
    /// # Errors
    ///
    /// Returns [`crate::ApiscopeError::Generator`] when generation fails
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedTests>;
}
