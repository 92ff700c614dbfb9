use crate::config::types::{OutputLimits, SandboxConfig, ScriptLimits};
use crate::core::collector::{collect_frames, Collected, Termination};
use crate::core::context::ExecutionContext;
use crate::core::types::{ConsoleLevel, Frame};
use crate::observability::audit::events;
use crate::script::console::CaptureSink;
use crate::script::run_script;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a cancelled run gets to notice its flag before it is detached
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Thread-per-run execution context.
///
/// Cheaper than a worker process, but a timeout can only ask the engine to
/// stop (it checks the cancel flag between operations); there is no hard kill.
/// Use for tests and trusted catalog examples.
pub struct InProcessContext {
    script: ScriptLimits,
    output: OutputLimits,
}

struct ChannelSink {
    tx: Sender<Frame>,
}

impl CaptureSink for ChannelSink {
    fn capture(&self, level: ConsoleLevel, text: String) {
        let _ = self.tx.send(Frame::Line { level, text });
    }
}

impl InProcessContext {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            script: config.script.clone(),
            output: config.output.clone(),
        }
    }
}

impl ExecutionContext for InProcessContext {
    fn name(&self) -> &'static str {
        "in_process"
    }

    fn run(&self, run_id: Uuid, source: &str, deadline: Instant) -> Collected {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));

        let source = source.to_string();
        let limits = self.script.clone();
        let flag = Arc::clone(&cancel);
        let spawned = std::thread::Builder::new()
            .name(format!("patternbox-run-{}", run_id))
            .spawn(move || {
                let sink = Rc::new(ChannelSink { tx: tx.clone() });
                let terminal = match run_script(&source, &limits, sink, Some(flag)) {
                    Ok(()) => Frame::Done,
                    Err(message) => Frame::Failed { message },
                };
                let _ = tx.send(terminal);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return Collected::internal(&self.output, format!("spawn(run thread): {}", e))
            }
        };

        let mut collected = collect_frames(&rx, deadline, &self.output);

        match &mut collected.termination {
            Termination::TimedOut => {
                cancel.store(true, Ordering::Relaxed);
                if drain_until_disconnect(&rx, CANCEL_GRACE) {
                    let _ = handle.join();
                } else {
                    log::warn!(
                        "Run {} ignored cancellation for {:?}; detaching its thread",
                        run_id,
                        CANCEL_GRACE
                    );
                }
            }
            Termination::Crashed(detail) => {
                *detail = match handle.join() {
                    Err(payload) => format!("panic: {}", panic_message(&*payload)),
                    Ok(()) => "run thread ended without a result".to_string(),
                };
                events::context_crashed(run_id, detail.clone());
            }
            _ => {
                let _ = handle.join();
            }
        }

        collected
    }
}

/// Wait for every sender to go away. False if `grace` ran out first.
fn drain_until_disconnect(rx: &crossbeam_channel::Receiver<Frame>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
