// Config Validation
// Startup validation: fail fast with actionable errors before any worker is spawned

use crate::config::types::{Isolation, Result, SandboxConfig, SandboxError};

/// Longest timeout accepted; anything above is almost certainly a unit mistake
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Smallest address-space limit the worker can start with
const MIN_WORKER_MEMORY: u64 = 32 * 1024 * 1024;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config before constructing a sandbox.
/// Errors are fatal; warnings are logged and returned for display.
pub fn validate_config(config: &SandboxConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();

    validate_timing(config, &mut result);
    validate_output(config, &mut result);
    validate_script_limits(config, &mut result);
    validate_worker(config, &mut result);

    for warning in &result.warnings {
        log::warn!("config: {}", warning);
    }

    if !result.is_valid() {
        return Err(SandboxError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_timing(config: &SandboxConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 {
        result.add_error("timeout_ms cannot be zero".to_string());
    }
    if config.timeout_ms > MAX_TIMEOUT_MS {
        result.add_error(format!(
            "timeout_ms {} exceeds maximum {}",
            config.timeout_ms, MAX_TIMEOUT_MS
        ));
    }
    if config.min_interval_ms == 0 {
        result.add_warning(
            "min_interval_ms is zero; overlapping executions are no longer prevented".to_string(),
        );
    }
}

fn validate_output(config: &SandboxConfig, result: &mut ValidationResult) {
    if config.output.max_lines == 0 {
        result.add_error("output.max_lines cannot be zero".to_string());
    }
    if config.output.max_line_bytes < 16 {
        result.add_error(format!(
            "output.max_line_bytes {} is below the minimum of 16",
            config.output.max_line_bytes
        ));
    }
}

fn validate_script_limits(config: &SandboxConfig, result: &mut ValidationResult) {
    let limits = &config.script;
    if limits.max_call_levels == 0 {
        result.add_error("script.max_call_levels cannot be zero".to_string());
    }
    if limits.max_string_size == 0 || limits.max_array_size == 0 || limits.max_map_size == 0 {
        result.add_error("script size limits cannot be zero".to_string());
    }
    if limits.max_expr_depth == 0 || limits.max_function_expr_depth == 0 {
        result.add_error("script expression depth limits cannot be zero".to_string());
    }
    if limits.max_operations == Some(0) {
        result.add_error("script.max_operations cannot be zero (omit it for unbounded)".to_string());
    }
}

fn validate_worker(config: &SandboxConfig, result: &mut ValidationResult) {
    // memory_limit_bytes and worker_command only apply to worker processes
    if config.isolation != Isolation::Process {
        return;
    }

    if let Some(program) = config.worker_command.first() {
        if program.trim().is_empty() {
            result.add_error("worker_command program cannot be empty".to_string());
        }
    }

    if let Some(limit) = config.memory_limit_bytes {
        if limit < MIN_WORKER_MEMORY {
            result.add_error(format!(
                "memory_limit_bytes {} is below the worker minimum of {}",
                limit, MIN_WORKER_MEMORY
            ));
        }
    }
}
