use crate::core::collector::Collected;
use std::time::Instant;
use uuid::Uuid;

/// Where admitted source runs.
///
/// An implementation owns the whole life of one run: start the evaluator,
/// stream its frames, stop it at `deadline`, and release everything it
/// acquired before returning. It never blocks the caller past the deadline by
/// more than its teardown cost.
pub trait ExecutionContext: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, run_id: Uuid, source: &str, deadline: Instant) -> Collected;
}
