//! Subcommand handlers.
//!
//! Handlers write their output to a caller-supplied writer so they can be
//! exercised without a terminal.

pub mod chat;
pub mod maintenance;
pub mod projects;
pub mod threads;

use crate::cli::Command;
use crate::state::AppState;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use std::io::Write;

/// Run one command to completion.
pub async fn run<W: Write + Send>(state: &AppState, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Project(cmd) => projects::run(state, cmd, out),
        Command::Thread(cmd) => threads::run(state, cmd, out),
        Command::Chat { thread, prompt } => {
            let pipeline = state.pipeline()?;
            chat::run(state, &pipeline, thread, &prompt.join(" "), out).await
        }
        Command::Search { query } => maintenance::search(state, &query.join(" "), out),
        Command::Export { path } => maintenance::export(state, &path, out),
        Command::Reindex => maintenance::reindex(state, out),
        Command::Stats => maintenance::stats(state, out),
    }
}

/// Explicit project id, else the last selected one.
pub(crate) fn current_project(state: &AppState, explicit: Option<i64>) -> Result<i64> {
    explicit
        .or_else(|| state.state_file.load().last_project_id)
        .ok_or_else(|| anyhow!("No project selected; pass --project or run `chatvault project select`"))
}

pub(crate) fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
