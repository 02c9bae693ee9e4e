//! Command-line interface for qa-forge.
//!
//! Provides the worker entry point plus operator commands for the queue
//! (migrate, enqueue, resume, unpark, stats) and an offline answer parser.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
