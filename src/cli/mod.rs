//! CLI module for the rembg-remove library
//!
//! This module is only available when the "cli" feature is enabled.

#[path = "main.rs"]
mod main_impl;

pub use main_impl::{execute, main, Cli, InvocationError, Outcome, USAGE};
