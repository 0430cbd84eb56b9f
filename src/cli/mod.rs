//! Command-line interface for neuroadapt.
//!
//! Provides commands to adapt a request, inspect its fingerprint and
//! rendered prompt, and list configured providers.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
