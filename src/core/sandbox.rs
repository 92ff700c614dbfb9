use crate::config::types::{
    ExecutionResult, ExecutionStatus, Isolation, Result, SandboxConfig, SandboxError,
};
use crate::config::validator::validate_config;
use crate::core::context::ExecutionContext;
use crate::core::flow::{Admitted, Execution};
use crate::core::inprocess::InProcessContext;
use crate::core::limiter::RateLimiter;
use crate::core::supervisor::ProcessContext;
use crate::observability::audit::events;
use crate::observability::metrics::SandboxMetrics;
use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Rate-limited, time-bounded script executor.
///
/// One instance owns one rate-limit window. Every call yields exactly one
/// [`ExecutionResult`]; script failures, timeouts, and infrastructure
/// failures are all reported as data, never as panics or `Err`.
pub struct Sandbox {
    config: SandboxConfig,
    limiter: RateLimiter,
    context: Arc<dyn ExecutionContext>,
    metrics: Arc<SandboxMetrics>,
}

impl Sandbox {
    /// Validate `config` and build the context it selects.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let context: Arc<dyn ExecutionContext> = match config.isolation {
            Isolation::Process => Arc::new(ProcessContext::from_config(&config)?),
            Isolation::InProcess => Arc::new(InProcessContext::from_config(&config)),
        };
        Self::with_context(config, context)
    }

    /// Build a sandbox around a caller-supplied context.
    pub fn with_context(config: SandboxConfig, context: Arc<dyn ExecutionContext>) -> Result<Self> {
        validate_config(&config)?;

        log::debug!(
            "Sandbox ready: context={}, timeout={}ms, min_interval={}ms",
            context.name(),
            config.timeout_ms,
            config.min_interval_ms
        );

        Ok(Self {
            limiter: RateLimiter::new(config.min_interval()),
            config,
            context,
            metrics: Arc::new(SandboxMetrics::default()),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn metrics(&self) -> &SandboxMetrics {
        &self.metrics
    }

    pub fn context_name(&self) -> &'static str {
        self.context.name()
    }

    /// Run `source` and block until it finishes or times out.
    pub fn execute(&self, source: &str) -> ExecutionResult {
        match self.admit(source) {
            Ok(admitted) => run_admitted(
                self.context.as_ref(),
                &self.metrics,
                admitted,
                self.config.timeout(),
            ),
            Err(rejected) => rejected,
        }
    }

    /// Rate-check now and run in the background.
    ///
    /// The check happens before this returns, so submission order decides
    /// which of two close requests is admitted.
    pub fn submit(&self, source: impl Into<String>) -> PendingExecution {
        let source = source.into();
        let admitted = match self.admit(&source) {
            Ok(admitted) => admitted,
            Err(rejected) => return PendingExecution::ready(rejected),
        };

        let run_id = admitted.run_id();
        let context = Arc::clone(&self.context);
        let metrics = Arc::clone(&self.metrics);
        let timeout = self.config.timeout();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let spawned = std::thread::Builder::new()
            .name(format!("patternbox-submit-{}", run_id))
            .spawn(move || {
                let result = run_admitted(context.as_ref(), &metrics, admitted, timeout);
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => PendingExecution {
                run_id: Some(run_id),
                state: PendingState::Running(rx),
            },
            Err(e) => {
                let result = internal_result(run_id, format!("spawn(submit thread): {}", e));
                self.metrics.record(&result);
                events::execution_end(run_id, &result);
                PendingExecution::ready(result)
            }
        }
    }

    fn admit(&self, source: &str) -> std::result::Result<Execution<Admitted>, ExecutionResult> {
        match Execution::new(source).rate_check(&self.limiter) {
            Ok(admitted) => {
                self.metrics.accepted.inc();
                events::execution_start(admitted.run_id(), self.config.isolation, source.len());
                Ok(admitted)
            }
            Err(SandboxError::RateLimited { retry_after_ms }) => {
                events::rate_limited(retry_after_ms);
                let result = ExecutionResult::rate_limited();
                self.metrics.record(&result);
                Err(result)
            }
            Err(other) => {
                log::error!("Admission failed: {}", other);
                let result = ExecutionResult {
                    error: Some(other.to_string()),
                    status: ExecutionStatus::InternalError,
                    ..Default::default()
                };
                self.metrics.record(&result);
                Err(result)
            }
        }
    }
}

fn run_admitted(
    context: &dyn ExecutionContext,
    metrics: &SandboxMetrics,
    admitted: Execution<Admitted>,
    timeout: Duration,
) -> ExecutionResult {
    let run_id = admitted.run_id();
    let result = admitted.run(context, timeout);

    if result.truncated {
        events::output_truncated(run_id, result.output.len());
    }
    metrics.record(&result);
    events::execution_end(run_id, &result);
    result
}

fn internal_result(run_id: Uuid, message: String) -> ExecutionResult {
    ExecutionResult {
        error: Some(message),
        status: ExecutionStatus::InternalError,
        run_id: Some(run_id),
        ..Default::default()
    }
}

enum PendingState {
    Running(Receiver<ExecutionResult>),
    Ready(ExecutionResult),
}

/// Handle to a submitted execution
pub struct PendingExecution {
    run_id: Option<Uuid>,
    state: PendingState,
}

impl PendingExecution {
    fn ready(result: ExecutionResult) -> Self {
        Self {
            run_id: result.run_id,
            state: PendingState::Ready(result),
        }
    }

    /// Run id of an admitted request; `None` if it was rejected.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Block until the result is available.
    pub fn wait(self) -> ExecutionResult {
        let run_id = self.run_id;
        match self.state {
            PendingState::Ready(result) => result,
            PendingState::Running(rx) => rx
                .recv()
                .unwrap_or_else(|_| lost_result(run_id)),
        }
    }

    /// Return the result if it is available, without blocking.
    pub fn try_result(&mut self) -> Option<ExecutionResult> {
        if let PendingState::Running(rx) = &self.state {
            let result = match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => lost_result(self.run_id),
            };
            self.state = PendingState::Ready(result);
        }

        match &self.state {
            PendingState::Ready(result) => Some(result.clone()),
            PendingState::Running(_) => None,
        }
    }
}

fn lost_result(run_id: Option<Uuid>) -> ExecutionResult {
    ExecutionResult {
        error: Some("Execution worker thread exited without a result".to_string()),
        status: ExecutionStatus::InternalError,
        run_id,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RATE_LIMIT_MESSAGE;
    use std::time::Instant;

    fn in_process(min_interval_ms: u64, timeout_ms: u64) -> Sandbox {
        Sandbox::new(SandboxConfig {
            isolation: Isolation::InProcess,
            min_interval_ms,
            timeout_ms,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn executes_and_escapes_output() {
        let sandbox = in_process(0, 5000);
        let result = sandbox.execute(r#"console.log("<script>");"#);
        assert!(result.is_success());
        assert_eq!(result.output, vec!["&lt;script&gt;"]);
        assert!(result.run_id.is_some());
    }

    #[test]
    fn second_call_inside_interval_is_rejected() {
        let sandbox = in_process(1000, 5000);
        let first = sandbox.execute(r#"console.log("one");"#);
        let second = sandbox.execute(r#"console.log("two");"#);

        assert!(first.is_success());
        assert_eq!(second.status, ExecutionStatus::RateLimited);
        assert_eq!(second.error.as_deref(), Some(RATE_LIMIT_MESSAGE));
        assert!(second.output.is_empty());
        assert!(second.run_id.is_none());

        let snapshot = sandbox.metrics().snapshot();
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.rate_limited, 1);
    }

    #[test]
    fn thrown_error_is_reported_verbatim() {
        let sandbox = in_process(0, 5000);
        let result = sandbox.execute(r#"throw "boom";"#);
        assert_eq!(result.status, ExecutionStatus::Errored);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn infinite_loop_times_out() {
        let sandbox = in_process(0, 200);
        let started = Instant::now();
        let result = sandbox.execute("loop { }");
        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert_eq!(
            result.error.as_deref(),
            Some("Execution timed out after 200ms")
        );
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(sandbox.metrics().snapshot().timed_out, 1);
    }

    #[test]
    fn submit_rate_checks_synchronously() {
        let sandbox = in_process(60_000, 5000);
        let first = sandbox.submit(r#"console.log("queued");"#);
        let mut second = sandbox.submit("1");

        assert!(first.run_id().is_some());
        assert_eq!(second.run_id(), None);
        assert_eq!(
            second.try_result().map(|r| r.status),
            Some(ExecutionStatus::RateLimited)
        );

        let result = first.wait();
        assert_eq!(result.output, vec!["queued"]);
    }

    #[test]
    fn try_result_eventually_yields() {
        let sandbox = in_process(0, 5000);
        let mut pending = sandbox.submit(r#"console.log("later");"#);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = loop {
            if let Some(result) = pending.try_result() {
                break result;
            }
            assert!(Instant::now() < deadline, "submit never finished");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(result.output, vec!["later"]);
        // a ready handle keeps answering
        assert!(pending.try_result().is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Sandbox::new(SandboxConfig {
            isolation: Isolation::InProcess,
            timeout_ms: 0,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, SandboxError::Config(_)));
    }
}
