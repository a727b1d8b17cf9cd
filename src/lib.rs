//! Apiscope - parallel inference over recorded HTTP sessions
//!
//! A recorded session is fanned out to independent analyzers (schema
//! extraction, GraphQL inference, latency profiling, heuristic suggestions,
//! environment extraction) under a bounded concurrency budget. Each analyzer
//! fails in isolation; the orchestrator aggregates results and progress.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod generator;
pub mod heuristics;
pub mod latency;
pub mod orchestrator;
pub mod schema;
pub mod session;
pub mod storage;
pub mod wire;

pub use error::{ApiscopeError, Result};
