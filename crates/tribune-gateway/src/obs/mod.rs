//! Lightweight in-process metrics (dependency-free).
//!
//! Counters and gauges are atomics keyed by sorted label sets and rendered
//! in Prometheus text format by the `/metrics` handler.

pub mod metrics;

pub use metrics::RelayMetrics;
