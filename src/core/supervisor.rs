use crate::config::types::{OutputLimits, Result, SandboxConfig, SandboxError, ScriptLimits};
use crate::core::collector::{collect_frames, Collected, Termination};
use crate::core::context::ExecutionContext;
use crate::core::types::{Frame, WorkerRequest};
use crate::observability::audit::events;
use crate::utils::process_hygiene::{configure_worker_command, WorkerLimits};
use crossbeam_channel::Sender;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a worker that sent its terminal frame gets to exit on its own
const EXIT_GRACE: Duration = Duration::from_millis(200);
const EXIT_POLL: Duration = Duration::from_millis(5);

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> SandboxError {
    SandboxError::Process(format!("{}: {}", prefix, err))
}

/// Process-isolated execution context.
///
/// Every run gets a fresh worker: this binary re-executed with the hidden
/// worker role. The request goes in on stdin as one JSON document; frames come
/// back on stdout one JSON object per line. On timeout the worker's whole
/// process group is SIGKILLed and reaped before `run` returns.
pub struct ProcessContext {
    command: Vec<String>,
    limits: WorkerLimits,
    script: ScriptLimits,
    output: OutputLimits,
}

/// Live worker plus the threads draining its pipes
struct Worker {
    child: Child,
    pid: Pid,
    stdout_reader: JoinHandle<()>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl ProcessContext {
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let command = config.resolve_worker_command()?;
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(SandboxError::Config("empty worker command".to_string()));
        }

        Ok(Self {
            command,
            limits: WorkerLimits::from_config(config),
            script: config.script.clone(),
            output: config.output.clone(),
        })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn spawn(&self, request: &WorkerRequest, frames: Sender<Frame>) -> Result<Worker> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_worker_command(&mut cmd, self.limits);

        let mut child = cmd.spawn().map_err(|e| to_process_error("spawn(worker)", e))?;
        let pid = Pid::from_raw(child.id() as i32);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        let Some(stdout) = stdout else {
            reap_after_kill(&mut child, pid);
            return Err(SandboxError::Process("worker stdout not captured".to_string()));
        };

        let run_id = request.run_id;
        let stdout_reader = match std::thread::Builder::new()
            .name("patternbox-frames".to_string())
            .spawn(move || read_frames(stdout, frames, run_id))
        {
            Ok(handle) => handle,
            Err(e) => {
                reap_after_kill(&mut child, pid);
                return Err(to_process_error("spawn(frame reader)", e));
            }
        };

        let stderr_reader = stderr.and_then(|stderr| {
            std::thread::Builder::new()
                .name("patternbox-worker-log".to_string())
                .spawn(move || forward_worker_log(stderr))
                .ok()
        });

        // A worker that dies before reading its request shows up as a crash
        // through the frame channel, so a broken pipe here is not fatal.
        if let Some(mut stdin) = stdin {
            if let Err(e) = serde_json::to_writer(&mut stdin, request)
                .map_err(std::io::Error::from)
                .and_then(|_| stdin.flush())
            {
                log::warn!("Failed to deliver request to worker {}: {}", pid, e);
            }
        }

        Ok(Worker {
            child,
            pid,
            stdout_reader,
            stderr_reader,
        })
    }
}

impl ExecutionContext for ProcessContext {
    fn name(&self) -> &'static str {
        "process"
    }

    fn run(&self, run_id: Uuid, source: &str, deadline: Instant) -> Collected {
        let request = WorkerRequest {
            run_id,
            source: source.to_string(),
            limits: self.script.clone(),
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut worker = match self.spawn(&request, tx) {
            Ok(worker) => worker,
            Err(e) => {
                log::error!("Worker launch failed for run {}: {}", run_id, e);
                return Collected::internal(&self.output, e.to_string());
            }
        };
        log::debug!("Worker {} started for run {}", worker.pid, run_id);

        let mut collected = collect_frames(&rx, deadline, &self.output);

        match &mut collected.termination {
            Termination::Completed | Termination::Failed(_) => {
                if !wait_with_grace(&mut worker.child, EXIT_GRACE) {
                    log::warn!("Worker {} lingered after its terminal frame", worker.pid);
                    reap_after_kill(&mut worker.child, worker.pid);
                }
            }
            Termination::TimedOut => {
                let status = reap_after_kill(&mut worker.child, worker.pid);
                events::timeout_kill(
                    run_id,
                    worker.pid.as_raw(),
                    format!("deadline reached, group killed ({})", describe_status(status)),
                );
            }
            Termination::Crashed(detail) => {
                let status = if wait_with_grace(&mut worker.child, EXIT_GRACE) {
                    worker.child.try_wait().ok().flatten()
                } else {
                    reap_after_kill(&mut worker.child, worker.pid)
                };
                *detail = describe_status(status);
                events::context_crashed(run_id, detail.clone());
            }
            Termination::Internal(_) => {
                reap_after_kill(&mut worker.child, worker.pid);
            }
        }

        // The group is gone, so both pipes are at EOF.
        let _ = worker.stdout_reader.join();
        if let Some(handle) = worker.stderr_reader.take() {
            let _ = handle.join();
        }

        collected
    }
}

/// Parse frames off the worker's stdout until EOF or a malformed line.
fn read_frames(stdout: ChildStdout, frames: Sender<Frame>, run_id: Uuid) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Worker stdout read failed for run {}: {}", run_id, e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Frame>(&line) {
            Ok(frame) => {
                let terminal = frame.is_terminal();
                // Receiver gone means the host stopped listening; keep draining so
                // the worker never blocks on a full pipe.
                let _ = frames.send(frame);
                if terminal {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Malformed frame from worker for run {}: {}", run_id, e);
                return;
            }
        }
    }
}

fn forward_worker_log(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines().map_while(std::io::Result::ok) {
        log::debug!(target: "patternbox::worker", "{}", line);
    }
}

/// Poll for exit for up to `grace`. True if the worker has exited.
fn wait_with_grace(child: &mut Child, grace: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if start.elapsed() < grace => std::thread::sleep(EXIT_POLL),
            Ok(None) => return false,
            Err(e) => {
                log::warn!("wait(worker) failed: {}", e);
                return false;
            }
        }
    }
}

/// SIGKILL the worker's process group and reap the leader.
fn reap_after_kill(child: &mut Child, pid: Pid) -> Option<ExitStatus> {
    if let Err(e) = killpg(pid, Signal::SIGKILL) {
        log::debug!("killpg({}) failed, falling back to direct kill: {}", pid, e);
        let _ = child.kill();
    }

    match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            log::warn!("wait(worker {}) failed after kill: {}", pid, e);
            None
        }
    }
}

fn describe_status(status: Option<ExitStatus>) -> String {
    let Some(status) = status else {
        return "exit status unavailable".to_string();
    };

    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    match status.signal() {
        Some(raw) => match Signal::try_from(raw) {
            Ok(signal) => format!("killed by {}", signal.as_str()),
            Err(_) => format!("killed by signal {}", raw),
        },
        None => "exit status unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_context(script: &str) -> ProcessContext {
        let config = SandboxConfig {
            worker_command: vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
            ..Default::default()
        };
        ProcessContext::from_config(&config).unwrap()
    }

    #[test]
    fn describe_status_names_codes_and_signals() {
        assert_eq!(
            describe_status(Some(ExitStatus::from_raw(3 << 8))),
            "exit code 3"
        );
        assert_eq!(
            describe_status(Some(ExitStatus::from_raw(libc::SIGKILL))),
            "killed by SIGKILL"
        );
        assert_eq!(describe_status(None), "exit status unavailable");
    }

    #[test]
    fn empty_worker_command_is_rejected() {
        let config = SandboxConfig {
            worker_command: vec![" ".to_string()],
            ..Default::default()
        };
        assert!(ProcessContext::from_config(&config).is_err());
    }

    #[test]
    fn frames_from_worker_are_collected() {
        let context = shell_context(
            r#"/bin/cat >/dev/null; echo '{"kind":"line","level":"log","text":"hi"}'; echo '{"kind":"done"}'"#,
        );
        let collected = context.run(
            Uuid::new_v4(),
            "ignored",
            Instant::now() + Duration::from_secs(5),
        );
        assert_eq!(collected.termination, Termination::Completed);
        assert_eq!(collected.output.into_parts().0, vec!["hi"]);
    }

    #[test]
    fn worker_exit_without_terminal_frame_is_a_crash() {
        let context = shell_context("/bin/cat >/dev/null; exit 7");
        let collected = context.run(
            Uuid::new_v4(),
            "ignored",
            Instant::now() + Duration::from_secs(5),
        );
        assert_eq!(
            collected.termination,
            Termination::Crashed("exit code 7".to_string())
        );
    }

    #[test]
    fn hung_worker_is_killed_at_deadline() {
        let context = shell_context(
            r#"/bin/cat >/dev/null; echo '{"kind":"line","level":"log","text":"started"}'; exec /bin/sleep 30"#,
        );
        let started = Instant::now();
        let collected = context.run(
            Uuid::new_v4(),
            "ignored",
            Instant::now() + Duration::from_millis(300),
        );
        assert_eq!(collected.termination, Termination::TimedOut);
        assert_eq!(collected.output.into_parts().0, vec!["started"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_worker_binary_is_internal_error() {
        let config = SandboxConfig {
            worker_command: vec!["/nonexistent/patternbox-worker".to_string()],
            ..Default::default()
        };
        let context = ProcessContext::from_config(&config).unwrap();
        let collected = context.run(
            Uuid::new_v4(),
            "ignored",
            Instant::now() + Duration::from_secs(1),
        );
        assert!(matches!(collected.termination, Termination::Internal(_)));
    }
}
