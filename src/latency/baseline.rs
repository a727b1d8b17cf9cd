//! Latency baselines and their persistence

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::profiler::{endpoint_metrics, Comparison, Profiler};
use super::LatencyMetrics;
use crate::endpoint::EndpointKey;
use crate::session::RecordingSession;
use crate::storage::KeyValueStore;
use crate::Result;

/// Key prefix for stored baselines
pub const BASELINE_KEY_PREFIX: &str = "baseline.";

/// Latency snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// Session the snapshot was taken from
    pub session_id: String,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Metrics per endpoint
    pub metrics: BTreeMap<EndpointKey, LatencyMetrics>,
}

/// Snapshot the per-endpoint metrics of a session
#[must_use]
pub fn capture_baseline(session: &RecordingSession) -> Baseline {
    Baseline {
        session_id: session.id.clone(),
        captured_at: Utc::now(),
        metrics: endpoint_metrics(&session.requests),
    }
}

/// Compare a session with a baseline using the given profiler settings
#[must_use]
pub fn compare_to_baseline(
    profiler: &Profiler,
    session: &RecordingSession,
    baseline: &Baseline,
) -> BTreeMap<EndpointKey, Comparison> {
    profiler.compare(session, &baseline.metrics)
}

/// Stores baselines as JSON, one key per session id
///
/// Saving replaces any previous baseline of the same session.
pub struct BaselineRepository<S> {
    store: S,
}

impl<S: KeyValueStore> BaselineRepository<S> {
    /// Wrap a store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn key(session_id: &str) -> String {
        format!("{BASELINE_KEY_PREFIX}{session_id}")
    }

    /// Persist a baseline
    ///
    /// # Errors
    ///
    /// Returns error if the session id is not a valid key or the write fails
    pub fn save(&self, baseline: &Baseline) -> Result<()> {
        let bytes = serde_json::to_vec(baseline)?;
        self.store.put(&Self::key(&baseline.session_id), &bytes)?;
        info!(
            "Saved baseline for session {} ({} endpoints)",
            baseline.session_id,
            baseline.metrics.len()
        );
        Ok(())
    }

    /// Load the baseline of a session
    ///
    /// # Errors
    ///
    /// Returns error if the stored value is unreadable
    pub fn load(&self, session_id: &str) -> Result<Option<Baseline>> {
        let Some(bytes) = self.store.get(&Self::key(session_id))? else {
            debug!("No baseline stored for session {session_id}");
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Delete the baseline of a session
    ///
    /// # Errors
    ///
    /// Returns error if the removal fails
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        self.store.delete(&Self::key(session_id))
    }

    /// Session ids with a stored baseline
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(BASELINE_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
