//! CLI command handlers

pub mod commands;

pub use commands::{apply, chain, inspect, validate, RunOptions};
