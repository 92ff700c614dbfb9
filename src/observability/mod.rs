//! Observability
//!
//! Structured audit events and per-sandbox metrics.

pub mod audit;
pub mod metrics;
