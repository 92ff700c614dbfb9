//! Configuration
//!
//! Sandbox configuration types, file loading, and startup validation.

pub mod loader;
pub mod types;
pub mod validator;
