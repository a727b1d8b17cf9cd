//! Latency profiling over recorded durations
//!
//! Samples are the positive durations of a session's exchanges, grouped by
//! [`EndpointKey`](crate::endpoint::EndpointKey). Percentiles use the
//! nearest-rank method.

mod baseline;
mod metrics;
mod profiler;

pub use baseline::{
    capture_baseline, compare_to_baseline, Baseline, BaselineRepository, BASELINE_KEY_PREFIX,
};
pub use metrics::{percentile, LatencyMetrics};
pub use profiler::{
    endpoint_metrics, is_critical, Comparison, EndpointProfile, PerformanceProfile, Profiler,
    Recommendation, RecommendationKind, Thresholds,
};
