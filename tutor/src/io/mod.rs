//! I/O helpers for tutor commands.

pub mod catalog;
pub mod config;
pub mod presenter;
pub mod process;
pub mod setup;
pub mod solutions;
pub mod store;
pub mod text;
pub mod verifier;
