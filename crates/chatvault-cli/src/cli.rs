//! Command-line definitions.

use crate::logging::{LogConfig, LogFormat, LogPreset};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Chatvault - project-organised chat history with Gemini.
#[derive(Parser, Debug)]
#[command(name = "chatvault")]
#[command(about = "Project-organised chat threads with full-text search")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the database path from config
    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long, global = true)]
    pub trace: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Set log level for specific targets (e.g., "pipeline=debug" or "db=trace")
    /// Can be specified multiple times. Short targets are prefixed with "chatvault::";
    /// "chatvault=LEVEL" sets every chatvault target.
    #[arg(long = "log", value_name = "TARGET=LEVEL", global = true)]
    pub log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,
}

impl LogArgs {
    pub fn to_config(&self) -> LogConfig {
        let preset = LogPreset::from_flags(self.verbose, self.debug, self.trace, self.quiet);
        LogConfig::new(preset, self.log_format).with_overrides(&self.log_overrides)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, select and delete projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// List, inspect and clean up threads
    #[command(subcommand)]
    Thread(ThreadCommand),

    /// Send a prompt and stream the reply
    Chat {
        /// Continue this thread instead of starting a new one
        #[arg(long, value_name = "ID")]
        thread: Option<i64>,

        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Find messages containing every term
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Write every message to a CSV file
    Export { path: PathBuf },

    /// Rebuild the search index from the messages table
    Reindex,

    /// Show row counts and search index health
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List projects
    List,

    /// Create a project and select it
    Create {
        name: String,
        /// System prompt (defaults to the configured one)
        #[arg(short, long)]
        prompt: Option<String>,
        /// Generation model (defaults to the configured one)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Make a project current
    Select { id: i64 },

    /// Change a project's name or system prompt
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Change a project's generation model
    Model { id: i64, model: String },

    /// Delete a project with all of its threads
    Delete { id: i64 },

    /// Delete every thread in a project
    Clear { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ThreadCommand {
    /// List threads, most recent first
    List {
        #[arg(long, value_name = "ID")]
        project: Option<i64>,
    },

    /// Create an empty thread
    New {
        #[arg(long, value_name = "ID")]
        project: Option<i64>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Print a thread's messages
    Show { id: i64 },

    /// Rename a thread
    Rename { id: i64, name: String },

    /// Delete a thread and its messages
    Delete { id: i64 },

    /// Delete threads that have no messages
    Prune {
        #[arg(long, value_name = "ID")]
        project: Option<i64>,
        /// Thread to keep even if empty
        #[arg(long, value_name = "ID")]
        keep: Option<i64>,
    },
}
