//! Command-line interface for task-finalizer.
//!
//! Provides commands to finalize objectives, execute run documents and
//! batches, and inspect the prompt and response schema.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
