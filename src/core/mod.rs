//! Execution core.
//!
//! Admission (rate limiter, typestate flow), the two execution contexts, the
//! worker role they share a protocol with, and the `Sandbox` facade tying them
//! together. Script semantics live in `script`.

pub mod collector;
pub mod context;
pub mod flow;
pub mod inprocess;
pub mod limiter;
pub mod sandbox;
pub mod supervisor;
pub mod types;
pub mod worker;
