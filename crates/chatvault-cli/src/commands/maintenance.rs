//! Search, export and store maintenance commands.

use super::local_time;
use crate::state::AppState;
use anyhow::Result;
use chatvault_core::export_csv;
use std::io::Write;
use std::path::Path;

const PREVIEW_CHARS: usize = 80;

pub fn search<W: Write>(state: &AppState, query: &str, out: &mut W) -> Result<()> {
    let hits = state.store.search(query)?;
    if hits.is_empty() {
        writeln!(out, "No messages match '{}'", query.trim())?;
        return Ok(());
    }

    for hit in &hits {
        let thread = hit
            .thread_id
            .map(|id| format!("{} #{}", hit.thread_name, id))
            .unwrap_or_else(|| hit.thread_name.clone());
        writeln!(
            out,
            "{} / {}  [{}] {}",
            hit.project_name,
            thread,
            local_time(&hit.message.created_at),
            hit.message.role.label()
        )?;
        writeln!(out, "    {}", hit.message.preview(PREVIEW_CHARS))?;
    }
    writeln!(out, "{} matches", hits.len())?;
    Ok(())
}

pub fn export<W: Write>(state: &AppState, path: &Path, out: &mut W) -> Result<()> {
    let written = export_csv(&state.store, path)?;
    if written == 0 {
        writeln!(out, "Nothing to export")?;
    } else {
        writeln!(out, "Exported {} messages to {}", written, path.display())?;
    }
    Ok(())
}

pub fn reindex<W: Write>(state: &AppState, out: &mut W) -> Result<()> {
    let indexed = state.store.rebuild_search_index()?;
    writeln!(out, "Indexed {} messages", indexed)?;
    Ok(())
}

pub fn stats<W: Write>(state: &AppState, out: &mut W) -> Result<()> {
    let stats = state.store.storage_stats()?;
    let health = state.store.check_search_index()?;

    writeln!(out, "Database:  {}", state.config.db_path.display())?;
    writeln!(out, "Projects:  {}", stats.project_count)?;
    writeln!(out, "Threads:   {}", stats.thread_count)?;
    writeln!(out, "Messages:  {}", stats.message_count)?;
    if health.is_consistent() {
        writeln!(out, "Search index: ok ({} entries)", health.indexed)?;
    } else {
        writeln!(
            out,
            "Search index: {} missing, {} stale; run `chatvault reindex`",
            health.missing, health.stale
        )?;
    }
    Ok(())
}
