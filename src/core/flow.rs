//! Lifecycle of one execution request.
//!
//! Idle -> Admitted -> (run) -> ExecutionResult
//!
//! Each step consumes the prior state. Only `Execution<Admitted>` can run, so
//! nothing reaches an execution context without passing the rate check.

use crate::config::types::{ExecutionResult, ExecutionStatus, Result};
use crate::core::collector::{Collected, Termination};
use crate::core::context::ExecutionContext;
use crate::core::limiter::RateLimiter;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Type-state marker: request received, not yet checked
pub struct Idle;

/// Type-state marker: passed the rate check, run id assigned
pub struct Admitted;

pub struct Execution<S> {
    source: String,
    run_id: Option<Uuid>,
    _state: PhantomData<S>,
}

impl Execution<Idle> {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            run_id: None,
            _state: PhantomData,
        }
    }

    /// Consume the request against `limiter`.
    pub fn rate_check(self, limiter: &RateLimiter) -> Result<Execution<Admitted>> {
        limiter.try_acquire()?;
        Ok(Execution {
            source: self.source,
            run_id: Some(Uuid::new_v4()),
            _state: PhantomData,
        })
    }
}

impl Execution<Admitted> {
    pub fn run_id(&self) -> Uuid {
        self.run_id.unwrap_or_else(Uuid::nil)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run on `context` with a wall-clock budget of `timeout`.
    pub fn run(self, context: &dyn ExecutionContext, timeout: Duration) -> ExecutionResult {
        let run_id = self.run_id();
        let started = Instant::now();
        let collected = context.run(run_id, &self.source, started + timeout);
        finish(collected, run_id, started.elapsed(), timeout)
    }
}

/// Map a collected run onto the caller-facing result.
pub fn finish(
    collected: Collected,
    run_id: Uuid,
    elapsed: Duration,
    timeout: Duration,
) -> ExecutionResult {
    let (output, truncated) = collected.output.into_parts();

    let (status, error) = match collected.termination {
        Termination::Completed => (ExecutionStatus::Completed, None),
        Termination::Failed(message) => (ExecutionStatus::Errored, Some(message)),
        Termination::TimedOut => (
            ExecutionStatus::TimedOut,
            Some(format!("Execution timed out after {}ms", timeout.as_millis())),
        ),
        Termination::Crashed(detail) => (
            ExecutionStatus::InternalError,
            Some(format!("Execution context exited unexpectedly ({})", detail)),
        ),
        Termination::Internal(message) => (
            ExecutionStatus::InternalError,
            Some(format!("Execution context failed: {}", message)),
        ),
    };

    ExecutionResult {
        output,
        error,
        status,
        run_id: Some(run_id),
        wall_time_ms: elapsed.as_millis() as u64,
        truncated,
    }
}
