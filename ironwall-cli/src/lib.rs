//! Ironwall CLI library
//!
//! Exposes the command handlers and output plumbing of the `ironwall`
//! binary for integration testing.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
