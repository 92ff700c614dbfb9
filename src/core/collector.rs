/// Frame collection against a wall-clock deadline
///
/// Both execution contexts deliver frames over a channel. The collector drains
/// it into a bounded output buffer until a terminal frame, a disconnect, or the
/// deadline, whichever comes first.
use crate::config::types::OutputLimits;
use crate::core::types::Frame;
use crate::utils::output::OutputBuffer;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Instant;

/// How a run ended, before it is mapped onto a result
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Script and continuations finished
    Completed,
    /// Script raised an error; message is user-facing
    Failed(String),
    /// Deadline passed before a terminal frame
    TimedOut,
    /// Context vanished without a terminal frame
    Crashed(String),
    /// Sandbox-side failure (spawn, protocol)
    Internal(String),
}

/// Output captured up to the end of a run
#[derive(Debug)]
pub struct Collected {
    pub output: OutputBuffer,
    pub termination: Termination,
}

impl Collected {
    /// A run that failed before producing anything
    pub fn internal(limits: &OutputLimits, message: String) -> Self {
        Self {
            output: OutputBuffer::new(limits.clone()),
            termination: Termination::Internal(message),
        }
    }
}

/// Drain `rx` until a terminal frame, disconnect, or `deadline`.
///
/// A disconnect yields `Crashed` with an empty detail; the owning context
/// knows why its producer went away and fills it in.
pub fn collect_frames(rx: &Receiver<Frame>, deadline: Instant, limits: &OutputLimits) -> Collected {
    let mut output = OutputBuffer::new(limits.clone());

    let termination = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Termination::TimedOut;
        }

        match rx.recv_timeout(remaining) {
            Ok(Frame::Line { text, .. }) => output.push(text),
            Ok(Frame::Done) => break Termination::Completed,
            Ok(Frame::Failed { message }) => break Termination::Failed(message),
            Err(RecvTimeoutError::Timeout) => break Termination::TimedOut,
            Err(RecvTimeoutError::Disconnected) => break Termination::Crashed(String::new()),
        }
    };

    Collected {
        output,
        termination,
    }
}
