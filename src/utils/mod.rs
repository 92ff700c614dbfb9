//! Utilities
//!
//! - [`output`]: Bounded output collection
//! - [`sanitize`]: Captured value rendering and HTML entity escaping
//! - [`process_hygiene`]: Worker process limits and environment hygiene

pub mod output;
pub mod process_hygiene;
pub mod sanitize;
