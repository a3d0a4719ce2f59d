//! Shared helpers: terminal logging and external command execution.

pub mod exec;
pub mod log;
