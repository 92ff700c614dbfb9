use crate::config::types::ScriptLimits;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Console method a captured line came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 5] = [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
        ConsoleLevel::Debug,
    ];

    /// Levels exposed as `console.<method>`; `debug` is a reserved engine
    /// function and is captured through the engine's debug hook instead.
    pub const CONSOLE_METHODS: [ConsoleLevel; 4] = [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
    ];

    /// Method name as seen by scripts
    pub fn method_name(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Debug => "debug",
        }
    }
}

/// Host->worker launch contract, written as one JSON document on worker stdin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub run_id: Uuid,
    pub source: String,
    pub limits: ScriptLimits,
}

/// Worker->host message, one JSON object per stdout line.
///
/// Lines stream as they are captured so a timed-out run still reports what it
/// printed. Exactly one of `done`/`failed` ends a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Line { level: ConsoleLevel, text: String },
    Done,
    Failed { message: String },
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Line { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_by_kind() {
        let frame = Frame::Line {
            level: ConsoleLevel::Warn,
            text: "careful".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"kind":"line","level":"warn","text":"careful"}"#
        );
        assert_eq!(serde_json::to_string(&Frame::Done).unwrap(), r#"{"kind":"done"}"#);
    }

    #[test]
    fn failed_frame_decodes() {
        let frame: Frame = serde_json::from_str(r#"{"kind":"failed","message":"boom"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Failed {
                message: "boom".to_string()
            }
        );
        assert!(frame.is_terminal());
    }

    #[test]
    fn method_names_are_unique() {
        let mut names: Vec<_> = ConsoleLevel::ALL.iter().map(|l| l.method_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ConsoleLevel::ALL.len());
    }
}
