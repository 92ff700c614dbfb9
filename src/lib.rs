//! patternbox: a Gang-of-Four design pattern catalog with a bounded snippet runner
//!
//! # Architecture
//!
//! ## Catalog ([`catalog`])
//! - [`catalog::Catalog`]: read-only pattern records, lookup by id and category
//! - [`catalog::record`]: record, category, and participant types
//!
//! ## Execution Core ([`core`])
//! - [`core::sandbox`]: `Sandbox` facade (rate limit, timeout, result delivery)
//! - [`core::flow`]: type-state request lifecycle (`Idle` -> `Admitted` -> result)
//! - [`core::limiter`]: minimum-interval admission gate
//! - [`core::supervisor`]: worker-process execution context
//! - [`core::inprocess`]: thread execution context
//! - [`core::worker`]: worker role served by the re-executed binary
//! - [`core::collector`]: frame collection against a deadline
//!
//! ## Scripting ([`script`])
//! - [`script::console`]: console capture through an injected sink
//! - [`script::timers`]: `set_timeout` continuations
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: structured audit events
//! - [`observability::metrics`]: per-sandbox counters, Prometheus export
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: config, result, and error types
//! - [`config::loader`]: JSON config loading
//! - [`config::validator`]: startup validation
//!
//! ## Utilities ([`utils`])
//! - [`utils::sanitize`]: HTML-safe rendering of captured values
//! - [`utils::output`]: bounded output collection
//! - [`utils::process_hygiene`]: worker environment and rlimits
//!
//! # Isolation
//!
//! Snippets only see what the engine registers: a console, timers, and the
//! language's standard packages. The worker process bounds time, memory, and
//! crashes. It runs as the invoking user and is not a hardened security
//! boundary.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod observability;
pub mod script;
pub mod utils;

pub use catalog::{Catalog, CatalogError, Category, PatternRecord};
pub use config::types::{
    ExecutionResult, ExecutionStatus, Isolation, SandboxConfig, SandboxError,
    RATE_LIMIT_MESSAGE,
};
pub use core::sandbox::{PendingExecution, Sandbox};
