/// Core types and structures for the patternbox sandbox
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error text returned for a request that arrives inside the minimum interval
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait before running code again.";

/// Hidden CLI role used to re-exec the binary as an execution worker
pub const WORKER_ROLE: &str = "worker";

/// Where a script is evaluated
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Separate worker process, killed outright on timeout
    #[default]
    Process,
    /// Dedicated thread in the host process, cancelled through the engine's progress hook
    InProcess,
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isolation::Process => write!(f, "process"),
            Isolation::InProcess => write!(f, "in_process"),
        }
    }
}

/// Engine-level limits applied to every script
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptLimits {
    /// Abort after this many engine operations (None = unbounded, timeout still applies)
    pub max_operations: Option<u64>,
    /// Maximum function call nesting
    pub max_call_levels: usize,
    /// Maximum length of any string value (bytes)
    pub max_string_size: usize,
    /// Maximum number of array elements
    pub max_array_size: usize,
    /// Maximum number of object map entries
    pub max_map_size: usize,
    /// Maximum number of `set_timeout` callbacks per execution
    pub max_timers: usize,
    /// Maximum expression nesting at the top level
    pub max_expr_depth: usize,
    /// Maximum expression nesting inside `fn` bodies
    pub max_function_expr_depth: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: None,
            max_call_levels: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_timers: 1024,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
        }
    }
}

/// Bounds on captured console output
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputLimits {
    /// Lines kept per execution; the rest are drained and dropped
    pub max_lines: usize,
    /// Bytes kept per line, cut on a char boundary
    pub max_line_bytes: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_lines: 1000,
            max_line_bytes: 4096,
        }
    }
}

/// Sandbox configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Minimum interval between accepted executions (milliseconds)
    pub min_interval_ms: u64,
    /// Wall-clock budget for one execution, continuations included (milliseconds)
    pub timeout_ms: u64,
    /// Execution context flavor
    pub isolation: Isolation,
    /// Engine limits
    pub script: ScriptLimits,
    /// Captured output limits
    pub output: OutputLimits,
    /// Worker argv; empty means "this executable with the worker role flag"
    pub worker_command: Vec<String>,
    /// Address-space limit for the worker process (bytes)
    pub memory_limit_bytes: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            timeout_ms: 5000,
            isolation: Isolation::Process,
            script: ScriptLimits::default(),
            output: OutputLimits::default(),
            worker_command: Vec::new(),
            memory_limit_bytes: Some(512 * 1024 * 1024),
        }
    }
}

impl SandboxConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the argv used to launch a worker process.
    pub fn resolve_worker_command(&self) -> Result<Vec<String>> {
        if !self.worker_command.is_empty() {
            return Ok(self.worker_command.clone());
        }

        let exe = std::env::current_exe().map_err(|e| {
            SandboxError::Config(format!("cannot resolve current executable for worker: {}", e))
        })?;
        Ok(vec![
            exe.to_string_lossy().to_string(),
            "--internal-role".to_string(),
            WORKER_ROLE.to_string(),
        ])
    }
}

/// Terminal state of one execution request
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Script and all continuations finished
    #[default]
    Completed,
    /// Script raised an error (parse or runtime)
    Errored,
    /// Wall-clock budget exhausted, context torn down
    TimedOut,
    /// Rejected by the minimum-interval check, never ran
    RateLimited,
    /// Sandbox infrastructure failure (spawn, protocol, worker crash)
    InternalError,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Errored => write!(f, "errored"),
            ExecutionStatus::TimedOut => write!(f, "timed_out"),
            ExecutionStatus::RateLimited => write!(f, "rate_limited"),
            ExecutionStatus::InternalError => write!(f, "internal_error"),
        }
    }
}

/// Result of one execution request
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// Captured, sanitized output lines in call order
    pub output: Vec<String>,
    /// Human-readable failure message, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Terminal state
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Correlation id of an accepted request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Wall-clock time spent running (milliseconds)
    #[serde(default)]
    pub wall_time_ms: u64,
    /// Output limits dropped or cut lines
    #[serde(default)]
    pub truncated: bool,
}

impl ExecutionResult {
    /// Result for a request rejected by the rate limiter
    pub fn rate_limited() -> Self {
        Self {
            output: Vec::new(),
            error: Some(RATE_LIMIT_MESSAGE.to_string()),
            status: ExecutionStatus::RateLimited,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed && self.error.is_none()
    }
}

/// Custom error types for patternbox
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Rate limit exceeded, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

pub type Result<T> = std::result::Result<T, SandboxError>;
