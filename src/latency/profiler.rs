//! Per-endpoint latency profiling, thresholds and recommendations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LatencyMetrics;
use crate::config::ProfilerConfig;
use crate::endpoint::EndpointKey;
use crate::session::{RecordedExchange, RecordingSession};

/// Path fragments that mark an endpoint as critical
const CRITICAL_PATH_MARKERS: &[&str] = &["login", "auth", "payment", "checkout", "health", "status"];

/// Assertion bounds derived from the observed distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// p95 times the soft factor
    pub soft: f64,
    /// max times the hard factor
    pub hard: f64,
    /// p99 times the critical factor, critical endpoints only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
}

/// Profile of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointProfile {
    /// Distribution summary
    pub metrics: LatencyMetrics,
    /// Suggested assertion bounds
    pub thresholds: Thresholds,
    /// Whether the endpoint is on a critical path
    pub critical: bool,
}

/// Why an endpoint deserves attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    /// p95 above the slow threshold
    SlowResponse,
    /// Standard deviation above the mean
    HighVariance,
    /// p99 more than three times p50
    HeavyTail,
    /// Too few samples for stable thresholds
    FewSamples,
}

/// Advice attached to an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Endpoint concerned
    pub endpoint: EndpointKey,
    /// Category
    pub kind: RecommendationKind,
    /// Human readable advice
    pub message: String,
}

/// Latency profile of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceProfile {
    /// Per-endpoint profiles
    pub endpoints: BTreeMap<EndpointKey, EndpointProfile>,
    /// Endpoints on a critical path
    pub critical_endpoints: Vec<EndpointKey>,
    /// Advice in endpoint order
    pub recommendations: Vec<Recommendation>,
    /// Samples used across all endpoints
    pub total_samples: usize,
}

/// Current versus baseline metrics for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Metrics of the current session
    pub current: LatencyMetrics,
    /// Metrics stored in the baseline
    pub baseline: LatencyMetrics,
    /// Current p95 exceeds the baseline p95 times the regression factor
    pub is_regression: bool,
}

/// Latency profiler
#[derive(Debug, Clone, Copy, Default)]
pub struct Profiler {
    config: ProfilerConfig,
}

impl Profiler {
    /// Create a profiler
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        Self { config }
    }

    /// Profile every endpoint with at least one timed exchange
    #[must_use]
    pub fn profile(&self, session: &RecordingSession) -> PerformanceProfile {
        let mut profile = PerformanceProfile::default();

        for (key, metrics) in endpoint_metrics(&session.requests) {
            let critical = is_critical(&key);
            let thresholds = Thresholds {
                soft: metrics.p95 * self.config.soft_factor,
                hard: metrics.max * self.config.hard_factor,
                critical: critical.then(|| metrics.p99 * self.config.critical_factor),
            };

            profile.total_samples += metrics.samples;
            profile
                .recommendations
                .extend(self.recommendations(&key, &metrics));
            if critical {
                profile.critical_endpoints.push(key.clone());
            }
            profile.endpoints.insert(
                key,
                EndpointProfile {
                    metrics,
                    thresholds,
                    critical,
                },
            );
        }

        debug!(
            "Profiled {} endpoints from {} samples",
            profile.endpoints.len(),
            profile.total_samples
        );
        profile
    }

    /// Compare a session against a baseline
    ///
    /// Only endpoints present in both are reported.
    #[must_use]
    pub fn compare(
        &self,
        session: &RecordingSession,
        baseline: &BTreeMap<EndpointKey, LatencyMetrics>,
    ) -> BTreeMap<EndpointKey, Comparison> {
        endpoint_metrics(&session.requests)
            .into_iter()
            .filter_map(|(key, current)| {
                let previous = *baseline.get(&key)?;
                let is_regression = current.p95 > previous.p95 * self.config.regression_factor;
                Some((
                    key,
                    Comparison {
                        current,
                        baseline: previous,
                        is_regression,
                    },
                ))
            })
            .collect()
    }

    fn recommendations(&self, key: &EndpointKey, m: &LatencyMetrics) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let mut push = |kind, message: String| {
            out.push(Recommendation {
                endpoint: key.clone(),
                kind,
                message,
            });
        };

        if m.p95 > self.config.slow_threshold_ms {
            push(
                RecommendationKind::SlowResponse,
                format!(
                    "p95 of {:.0} ms exceeds {:.0} ms; consider caching or pagination",
                    m.p95, self.config.slow_threshold_ms
                ),
            );
        }
        if m.stddev > m.mean {
            push(
                RecommendationKind::HighVariance,
                format!(
                    "Standard deviation {:.1} ms exceeds the mean {:.1} ms; timing assertions may flake",
                    m.stddev, m.mean
                ),
            );
        }
        if m.p99 > 3.0 * m.p50 {
            push(
                RecommendationKind::HeavyTail,
                format!("p99 {:.0} ms is over three times p50 {:.0} ms", m.p99, m.p50),
            );
        }
        if m.samples < self.config.min_samples {
            push(
                RecommendationKind::FewSamples,
                format!(
                    "Only {} samples; record more traffic before trusting thresholds",
                    m.samples
                ),
            );
        }

        out
    }
}

/// Whether an endpoint is on a critical path
#[must_use]
pub fn is_critical(key: &EndpointKey) -> bool {
    let path = key.template.to_ascii_lowercase();
    key.method == "POST" || CRITICAL_PATH_MARKERS.iter().any(|m| path.contains(m))
}

/// Metrics per endpoint over exchanges with a positive duration
#[must_use]
pub fn endpoint_metrics(exchanges: &[RecordedExchange]) -> BTreeMap<EndpointKey, LatencyMetrics> {
    let mut samples: BTreeMap<EndpointKey, Vec<f64>> = BTreeMap::new();
    for exchange in exchanges {
        let (Some(duration), Some(key)) = (exchange.duration_ms(), EndpointKey::from_exchange(exchange))
        else {
            continue;
        };
        samples.entry(key).or_default().push(duration);
    }

    samples
        .into_iter()
        .filter_map(|(key, values)| LatencyMetrics::from_samples(&values).map(|m| (key, m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(method: &str, url: &str, duration: f64) -> RecordedExchange {
        let mut e = RecordedExchange::new(method, url);
        e.duration = Some(duration);
        e
    }

    fn session(requests: Vec<RecordedExchange>) -> RecordingSession {
        RecordingSession {
            requests,
            ..RecordingSession::default()
        }
    }

    #[test]
    fn test_profile_thresholds() {
        let durations = [10.0, 20.0, 30.0, 40.0, 100.0];
        let s = session(durations.iter().map(|d| timed("GET", "/api/items", *d)).collect());
        let profile = Profiler::default().profile(&s);

        let endpoint = &profile.endpoints[&EndpointKey::new("GET", "/api/items")];
        assert!((endpoint.metrics.p95 - 100.0).abs() < f64::EPSILON);
        assert!((endpoint.thresholds.soft - 120.0).abs() < 1e-9);
        assert!((endpoint.thresholds.hard - 150.0).abs() < 1e-9);
        assert!(endpoint.thresholds.critical.is_none());
        assert!(!endpoint.critical);
        assert_eq!(profile.total_samples, 5);
    }

    #[test]
    fn test_untimed_exchanges_ignored() {
        let mut untimed = RecordedExchange::new("GET", "/a");
        untimed.duration = Some(0.0);
        let s = session(vec![untimed, RecordedExchange::new("GET", "/b")]);
        let profile = Profiler::default().profile(&s);
        assert!(profile.endpoints.is_empty());
        assert!(profile.recommendations.is_empty());
    }

    #[test]
    fn test_critical_endpoints() {
        let s = session(vec![
            timed("GET", "/api/health", 5.0),
            timed("POST", "/api/orders", 50.0),
            timed("GET", "/api/orders", 50.0),
        ]);
        let profile = Profiler::default().profile(&s);
        assert_eq!(profile.critical_endpoints.len(), 2);

        let health = &profile.endpoints[&EndpointKey::new("GET", "/api/health")];
        assert!((health.thresholds.critical.unwrap() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_recommendations() {
        let s = session(vec![
            timed("GET", "/slow", 1500.0),
            timed("GET", "/slow", 1600.0),
            timed("GET", "/spiky", 10.0),
            timed("GET", "/spiky", 10.0),
            timed("GET", "/spiky", 10.0),
            timed("GET", "/spiky", 10.0),
            timed("GET", "/spiky", 10.0),
            timed("GET", "/spiky", 500.0),
        ]);
        let profile = Profiler::default().profile(&s);

        let kinds = |path: &str| -> Vec<RecommendationKind> {
            profile
                .recommendations
                .iter()
                .filter(|r| r.endpoint.template == path)
                .map(|r| r.kind)
                .collect()
        };
        assert_eq!(
            kinds("/slow"),
            vec![RecommendationKind::SlowResponse, RecommendationKind::FewSamples]
        );
        assert_eq!(
            kinds("/spiky"),
            vec![RecommendationKind::HighVariance, RecommendationKind::HeavyTail]
        );
    }

    #[test]
    fn test_compare_regression() {
        let before = endpoint_metrics(&[timed("GET", "/a", 100.0), timed("GET", "/gone", 5.0)]);
        let s = session(vec![timed("GET", "/a", 130.0), timed("GET", "/new", 1.0)]);

        let comparison = Profiler::default().compare(&s, &before);
        assert_eq!(comparison.len(), 1);
        assert!(comparison[&EndpointKey::new("GET", "/a")].is_regression);

        let lenient = Profiler::new(ProfilerConfig {
            regression_factor: 1.5,
            ..ProfilerConfig::default()
        });
        assert!(!lenient.compare(&s, &before)[&EndpointKey::new("GET", "/a")].is_regression);
    }
}
