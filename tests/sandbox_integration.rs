//! Integration tests for the execution sandbox
//!
//! Process-isolation tests launch the real `patternbox` binary as the worker,
//! so they cover the full host/worker protocol.

use patternbox::{ExecutionStatus, Isolation, Sandbox, SandboxConfig, RATE_LIMIT_MESSAGE};
use std::process::Command;
use std::time::{Duration, Instant};

fn worker_command() -> Vec<String> {
    vec![
        env!("CARGO_BIN_EXE_patternbox").to_string(),
        "--internal-role".to_string(),
        "worker".to_string(),
    ]
}

fn process_sandbox(min_interval_ms: u64, timeout_ms: u64) -> Sandbox {
    Sandbox::new(SandboxConfig {
        isolation: Isolation::Process,
        worker_command: worker_command(),
        min_interval_ms,
        timeout_ms,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_worker_captures_and_escapes_output() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute(
        r#"
        console.log("<script>alert('x')</script>");
        console.info("count", 3, true);
        console.log(#{ tag: "<b>" });
        "#,
    );

    assert!(result.is_success(), "unexpected failure: {:?}", result.error);
    assert_eq!(result.output.len(), 3);
    assert_eq!(
        result.output[0],
        "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt;"
    );
    assert_eq!(result.output[1], "count 3 true");
    assert_eq!(result.output[2], r#"{"tag":"&lt;b&gt;"}"#);
    assert!(!result.output.iter().any(|line| line.contains('<')));
}

#[test]
fn test_console_inside_user_function_is_captured() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute(
        r#"
        fn greet(name) { console.log("hi", name); }
        greet("bob");
        "#,
    );

    assert!(result.is_success(), "unexpected failure: {:?}", result.error);
    assert_eq!(result.output, vec!["hi bob"]);
}

#[test]
fn test_console_call_with_many_arguments() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute(r#"console.warn("a", 1, "<c>", false, #{ n: 2 });"#);

    assert!(result.is_success(), "unexpected failure: {:?}", result.error);
    assert_eq!(result.output, vec![r#"a 1 &lt;c&gt; false {"n":2}"#]);
}

#[test]
fn test_second_call_within_interval_is_rate_limited() {
    let sandbox = process_sandbox(1000, 5000);
    let first = sandbox.execute(r#"console.log("first");"#);
    let second = sandbox.execute(r#"console.log("second");"#);

    assert_eq!(first.output, vec!["first"]);
    assert_eq!(second.status, ExecutionStatus::RateLimited);
    assert_eq!(second.error.as_deref(), Some(RATE_LIMIT_MESSAGE));
    assert!(second.output.is_empty());
}

#[test]
fn test_infinite_loop_is_killed_with_partial_output() {
    let sandbox = process_sandbox(0, 500);
    let started = Instant::now();
    let result = sandbox.execute(r#"console.log("before the loop"); loop { }"#);

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(
        result.error.as_deref(),
        Some("Execution timed out after 500ms")
    );
    assert_eq!(result.output, vec!["before the loop"]);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_thrown_error_is_reported_verbatim() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute(r#"console.log("partial"); throw "boom";"#);

    assert_eq!(result.status, ExecutionStatus::Errored);
    assert_eq!(result.error.as_deref(), Some("boom"));
    assert_eq!(result.output, vec!["partial"]);
}

#[test]
fn test_syntax_error_is_reported() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute("let = ;");

    assert_eq!(result.status, ExecutionStatus::Errored);
    assert!(result.error.is_some());
    assert!(result.output.is_empty());
}

#[test]
fn test_timers_complete_before_result() {
    let sandbox = process_sandbox(0, 5000);
    let result = sandbox.execute(
        r#"
        set_timeout(|| console.log("third"), 50);
        set_timeout(|| console.log("second"));
        console.log("first");
        "#,
    );

    assert!(result.is_success());
    assert_eq!(result.output, vec!["first", "second", "third"]);
}

#[test]
fn test_worker_crash_is_internal_error() {
    let sandbox = Sandbox::new(SandboxConfig {
        worker_command: vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            r#"/bin/cat >/dev/null; echo '{"kind":"line","level":"log","text":"last words"}'; kill -SEGV $$"#
                .to_string(),
        ],
        min_interval_ms: 0,
        ..Default::default()
    })
    .unwrap();

    let result = sandbox.execute("ignored");
    assert_eq!(result.status, ExecutionStatus::InternalError);
    assert_eq!(result.output, vec!["last words"]);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("Execution context exited unexpectedly"));
}

#[test]
fn test_output_is_truncated_at_line_limit() {
    let mut config = SandboxConfig {
        worker_command: worker_command(),
        min_interval_ms: 0,
        ..Default::default()
    };
    config.output.max_lines = 5;
    let sandbox = Sandbox::new(config).unwrap();

    let result = sandbox.execute("for i in 0..20 { console.log(i); }");
    assert!(result.is_success());
    assert!(result.truncated);
    assert_eq!(result.output, vec!["0", "1", "2", "3", "4"]);
    assert_eq!(sandbox.metrics().snapshot().truncated, 1);
}

#[test]
fn test_cli_run_json_shape() {
    let output = Command::new(env!("CARGO_BIN_EXE_patternbox"))
        .args(["run", "--code", r#"console.log("hi");"#, "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["output"], serde_json::json!(["hi"]));
    assert_eq!(json["status"], "completed");
    assert!(json.get("error").is_none());
}

#[test]
fn test_cli_run_failure_exits_nonzero() {
    let output = Command::new(env!("CARGO_BIN_EXE_patternbox"))
        .args(["run", "--in-process", "--code", r#"throw "boom";"#])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("boom"));
}
