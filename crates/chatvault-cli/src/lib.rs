//! Chatvault command-line front end.
//!
//! Argument parsing, configuration, logging setup and subcommand handlers.
//! Separated from main.rs so the handlers can be tested directly.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod state;
