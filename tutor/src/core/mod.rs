//! Deterministic, pure logic shared by the tutor core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod command;
pub mod problem;
pub mod progress;
pub mod types;
