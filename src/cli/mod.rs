//! Command-line interface module.
//!
//! Provides argument parsing, one-shot blocklist commands and the
//! interactive console.

pub mod args;
pub mod commands;
pub mod console;
