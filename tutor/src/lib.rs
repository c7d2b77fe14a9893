//! Problem lifecycle and verification engine for command-line tutorials.
//!
//! A tutorial is a directory of problems. The learner selects one, writes a
//! program, and asks the tutor to verify it against the reference solution.
//!
//! - **[`core`]**: Pure, deterministic logic (command construction, progress
//!   counting, problem naming). No I/O.
//! - **[`io`]**: Side effects: configuration, the progress store, setup units,
//!   child processes and terminal output. Each collaborator the orchestration
//!   depends on sits behind a trait so tests can script it.
//!
//! Orchestration modules ([`controller`], [`select`], [`verify`]) coordinate
//! the two to implement CLI actions.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tutorial;
pub mod verify;
