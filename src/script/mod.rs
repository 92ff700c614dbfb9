//! Script evaluation.
//!
//! Builds a capability-restricted engine for one execution and runs a source
//! string to completion: main body first, then any `set_timeout` callbacks.
//! The engine only knows what is registered here (console, timers, the
//! standard language packages); there is no filesystem, network, storage, or
//! host-object access to deny.
//!
//! Used by both execution contexts: the worker process and the in-process
//! fallback thread.

pub mod console;
pub mod timers;

use crate::config::types::ScriptLimits;
use console::{register_console, CaptureSink, Console, CONSOLE_VAR};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timers::{register_timers, SharedTimers, TimerQueue};

/// Granularity of cancellation checks while waiting for a timer
const TIMER_POLL: Duration = Duration::from_millis(10);

/// Build an engine for one execution with console and timers bound.
pub fn build_engine(
    limits: &ScriptLimits,
    sink: Rc<dyn CaptureSink>,
    cancel: Option<Arc<AtomicBool>>,
) -> (Engine, Console, SharedTimers) {
    let mut engine = Engine::new();

    engine
        .set_max_call_levels(limits.max_call_levels)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_map_size)
        .set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth)
        .set_max_operations(limits.max_operations.unwrap_or(0));
    engine.disable_symbol("eval");

    let console = Console::new(sink);
    register_console(&mut engine, &console);

    let timers: SharedTimers = Rc::new(RefCell::new(TimerQueue::new(limits.max_timers)));
    register_timers(&mut engine, &timers);

    if let Some(flag) = cancel {
        engine.on_progress(move |_ops| {
            if flag.load(Ordering::Relaxed) {
                Some(Dynamic::from("execution cancelled".to_string()))
            } else {
                None
            }
        });
    }

    (engine, console, timers)
}

/// Run `source` and every callback it schedules.
///
/// Returns the failure message on a parse error, a thrown value, an engine
/// limit breach, or cancellation. Output has already been delivered to `sink`
/// by the time this returns.
pub fn run_script(
    source: &str,
    limits: &ScriptLimits,
    sink: Rc<dyn CaptureSink>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(), String> {
    let (engine, console, timers) = build_engine(limits, sink, cancel.clone());

    let ast = engine.compile(source).map_err(|e| e.to_string())?;

    let mut scope = Scope::new();
    scope.push(CONSOLE_VAR, console);
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| describe_error(&e))?;

    loop {
        // Release the borrow before calling back into the engine; callbacks may schedule more.
        let next = timers.borrow_mut().pop_next();
        let Some(timer) = next else {
            break;
        };
        wait_until(timer.due, cancel.as_deref())?;
        let _ = timer
            .callback
            .call::<Dynamic>(&engine, &ast, ())
            .map_err(|e| describe_error(&e))?;
    }

    Ok(())
}

fn wait_until(due: Instant, cancel: Option<&AtomicBool>) -> Result<(), String> {
    loop {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err("execution cancelled".to_string());
        }
        let now = Instant::now();
        if now >= due {
            return Ok(());
        }
        std::thread::sleep((due - now).min(TIMER_POLL));
    }
}

/// Human-readable message for a script failure.
///
/// A thrown value becomes the message verbatim: `throw "boom"` gives `boom`,
/// and a thrown map uses its `message` field when it has one.
pub fn describe_error(err: &EvalAltResult) -> String {
    match thrown_value(err) {
        Some(value) => {
            if let Some(map) = value.read_lock::<rhai::Map>() {
                if let Some(message) = map.get("message") {
                    return message.to_string();
                }
            }
            value.to_string()
        }
        None => err.to_string(),
    }
}

fn thrown_value(err: &EvalAltResult) -> Option<&Dynamic> {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => Some(value),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => thrown_value(inner),
        _ => None,
    }
}
