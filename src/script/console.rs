//! Console capture.
//!
//! Scripts see a `console` object whose methods forward rendered text to an
//! injected [`CaptureSink`]. Nothing reaches a real console: the engine's own
//! `print`/`debug` hooks are redirected to the same sink.

use crate::core::types::ConsoleLevel;
use crate::utils::sanitize::{escape_html, render_args};
use rhai::{Dynamic, Engine};
use std::rc::Rc;

/// Name the console handle is visible under
pub const CONSOLE_VAR: &str = "console";

/// Receives every captured line in call order.
pub trait CaptureSink {
    fn capture(&self, level: ConsoleLevel, text: String);
}

/// Script-visible console handle.
#[derive(Clone)]
pub struct Console {
    sink: Rc<dyn CaptureSink>,
}

impl Console {
    pub fn new(sink: Rc<dyn CaptureSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, level: ConsoleLevel, args: &[Dynamic]) {
        self.sink.capture(level, render_args(args));
    }
}

/// Most arguments a single console call accepts
pub const MAX_CONSOLE_ARGS: usize = 10;

// One overload per arity, zero through MAX_CONSOLE_ARGS. Receivers are by
// value: the handle the variable resolver returns is read-only.
macro_rules! register_console_arities {
    ($engine:expr, $name:expr, $level:expr, $( ( $($arg:ident),* ) ),+ $(,)?) => {
        $(
            $engine.register_fn($name, move |c: Console, $($arg: Dynamic),*| {
                c.emit($level, &[$($arg),*])
            });
        )+
    };
}

/// Register the `Console` type, its methods, and the print/debug redirects.
///
/// `console` resolves by name everywhere, including inside `fn` bodies that
/// cannot see the caller's scope. A `let console = ...` in the current scope
/// still shadows it.
pub fn register_console(engine: &mut Engine, console: &Console) {
    engine.register_type_with_name::<Console>("Console");

    for level in ConsoleLevel::CONSOLE_METHODS {
        let name = level.method_name();
        register_console_arities!(
            engine,
            name,
            level,
            (),
            (a),
            (a, b),
            (a, b, c),
            (a, b, c, d),
            (a, b, c, d, e),
            (a, b, c, d, e, f),
            (a, b, c, d, e, f, g),
            (a, b, c, d, e, f, g, h),
            (a, b, c, d, e, f, g, h, i),
            (a, b, c, d, e, f, g, h, i, j),
        );
    }

    let resolved = console.clone();
    engine.on_var(move |name, _index, context| {
        if name == CONSOLE_VAR && !context.scope().contains(CONSOLE_VAR) {
            Ok(Some(Dynamic::from(resolved.clone())))
        } else {
            Ok(None)
        }
    });

    let print_sink = Rc::clone(&console.sink);
    engine.on_print(move |text| print_sink.capture(ConsoleLevel::Log, escape_html(text)));

    let debug_sink = Rc::clone(&console.sink);
    engine.on_debug(move |text, _source, _pos| {
        debug_sink.capture(ConsoleLevel::Debug, escape_html(text))
    });
}
