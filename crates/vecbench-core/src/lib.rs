//! vecbench Core Library
//!
//! Concurrency-sweep throughput benchmark for pluggable vector-search
//! backends: a shared read-only query set, a start barrier, search
//! workers, the per-level runner and the sweep orchestrator.

pub mod backend;
pub mod barrier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod runner;
pub mod sweep;
pub mod worker;
