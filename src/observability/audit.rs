/// Structured audit events for the execution sandbox
///
/// Every accepted or rejected request leaves a trail under the
/// `patternbox::audit` log target:
/// - Correlation by run id (UUID v4 assigned at admission)
/// - Event types: start, rate limit rejection, end, timeout kill, context crash
/// - One JSON object per event so log shippers can parse without regexes
use crate::config::types::{ExecutionResult, ExecutionStatus, Isolation};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log target for audit events
pub const AUDIT_TARGET: &str = "patternbox::audit";

/// Audit event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

/// Types of audit events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    ExecutionStart,
    RateLimited,
    ExecutionEnd,
    TimeoutKill,
    ContextCrashed,
    OutputTruncated,
}

impl AuditEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::ExecutionStart => AuditSeverity::Low,
            AuditEventType::ExecutionEnd => AuditSeverity::Low,
            AuditEventType::RateLimited => AuditSeverity::Medium,
            AuditEventType::OutputTruncated => AuditSeverity::Medium,
            AuditEventType::TimeoutKill => AuditSeverity::Medium,
            AuditEventType::ContextCrashed => AuditSeverity::High,
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub run_id: Option<Uuid>,
    pub isolation: Option<Isolation>,
    pub status: Option<ExecutionStatus>,
    pub wall_time_ms: Option<u64>,
    pub output_lines: Option<usize>,
    pub worker_pid: Option<i32>,
}

impl AuditEvent {
    /// Create a new event with default severity
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            run_id: None,
            isolation: None,
            status: None,
            wall_time_ms: None,
            output_lines: None,
            worker_pid: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn with_worker_pid(mut self, pid: i32) -> Self {
        self.worker_pid = Some(pid);
        self
    }

    /// Attach outcome fields from a finished execution
    pub fn with_result(mut self, result: &ExecutionResult) -> Self {
        self.status = Some(result.status);
        self.wall_time_ms = Some(result.wall_time_ms);
        self.output_lines = Some(result.output.len());
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "event_type": self.event_type,
                "details": self.details,
                "encode_error": e.to_string(),
            })
        })
    }
}

/// Emit an event to the audit log target
pub fn log_event(event: AuditEvent) {
    let entry = event.to_json();
    match event.severity {
        AuditSeverity::High => error!(target: AUDIT_TARGET, "{}", entry),
        AuditSeverity::Medium => warn!(target: AUDIT_TARGET, "{}", entry),
        AuditSeverity::Low => info!(target: AUDIT_TARGET, "{}", entry),
    }
}

/// Convenience constructors for the events the sandbox emits
pub mod events {
    use super::*;

    pub fn execution_start(run_id: Uuid, isolation: Isolation, source_bytes: usize) {
        log_event(
            AuditEvent::new(
                AuditEventType::ExecutionStart,
                format!("accepted {} byte source", source_bytes),
            )
            .with_run_id(run_id)
            .with_isolation(isolation),
        );
    }

    pub fn rate_limited(retry_after_ms: u64) {
        log_event(AuditEvent::new(
            AuditEventType::RateLimited,
            format!("rejected; next execution allowed in {}ms", retry_after_ms),
        ));
    }

    pub fn execution_end(run_id: Uuid, result: &ExecutionResult) {
        let details = match &result.error {
            Some(message) => format!("{}: {}", result.status, message),
            None => result.status.to_string(),
        };
        log_event(
            AuditEvent::new(AuditEventType::ExecutionEnd, details)
                .with_run_id(run_id)
                .with_result(result),
        );
    }

    pub fn output_truncated(run_id: Uuid, kept_lines: usize) {
        log_event(
            AuditEvent::new(
                AuditEventType::OutputTruncated,
                format!("output limit reached, kept {} lines", kept_lines),
            )
            .with_run_id(run_id),
        );
    }

    pub fn timeout_kill(run_id: Uuid, worker_pid: i32, details: String) {
        log_event(
            AuditEvent::new(AuditEventType::TimeoutKill, details)
                .with_run_id(run_id)
                .with_worker_pid(worker_pid),
        );
    }

    pub fn context_crashed(run_id: Uuid, details: String) {
        log_event(AuditEvent::new(AuditEventType::ContextCrashed, details).with_run_id(run_id));
    }
}
