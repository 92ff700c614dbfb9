//! Worker role: the process side of [`ProcessContext`](super::supervisor::ProcessContext).
//!
//! Reads one [`WorkerRequest`] from stdin, runs it, and streams [`Frame`]s to
//! stdout, flushing after every line so the host sees output produced before
//! a timeout kill. Exits after the terminal frame.

use crate::config::types::{Result, SandboxError};
use crate::core::types::{ConsoleLevel, Frame, WorkerRequest};
use crate::script::console::CaptureSink;
use crate::script::run_script;
use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::rc::Rc;

/// Line-delimited JSON frame writer
struct FrameWriter<W: Write> {
    out: RefCell<W>,
    broken: Cell<bool>,
}

impl<W: Write> FrameWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
            broken: Cell::new(false),
        }
    }

    fn write_frame(&self, frame: &Frame) -> std::io::Result<()> {
        let mut out = self.out.borrow_mut();
        serde_json::to_writer(&mut *out, frame)?;
        out.write_all(b"\n")?;
        out.flush()
    }

    /// Once the host stops reading there is nobody left to tell, so later
    /// frames are dropped instead of failing the script mid-run.
    fn send(&self, frame: &Frame) {
        if self.broken.get() {
            return;
        }
        if let Err(e) = self.write_frame(frame) {
            log::debug!("Host pipe closed: {}", e);
            self.broken.set(true);
        }
    }
}

impl<W: Write> CaptureSink for FrameWriter<W> {
    fn capture(&self, level: ConsoleLevel, text: String) {
        self.send(&Frame::Line { level, text });
    }
}

/// Serve one request using this process's stdin and stdout.
pub fn run_worker() -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    serve(&input, std::io::stdout().lock())
}

/// Serve the JSON-encoded request in `input`, writing frames to `out`.
pub fn serve<W: Write + 'static>(input: &str, out: W) -> Result<()> {
    let request: WorkerRequest = serde_json::from_str(input)
        .map_err(|e| SandboxError::Protocol(format!("invalid worker request: {}", e)))?;
    log::debug!("Worker running {}", request.run_id);

    let writer = Rc::new(FrameWriter::new(out));
    let terminal = match run_script(&request.source, &request.limits, writer.clone(), None) {
        Ok(()) => Frame::Done,
        Err(message) => Frame::Failed { message },
    };

    writer.write_frame(&terminal)?;
    Ok(())
}
