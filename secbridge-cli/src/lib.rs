//! secbridge CLI library
//!
//! `main.rs` only parses arguments and maps errors to exit codes; the
//! command handlers live here so integration tests can drive them.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
