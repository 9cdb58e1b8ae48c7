//! `chatvault chat [--thread ID] PROMPT`

use crate::state::AppState;
use anyhow::{anyhow, bail, Result};
use chatvault_core::{ConversationPipeline, SessionContext};
use std::io::Write;
use tracing::warn;

/// Run one turn, streaming the reply to `out` as it arrives.
///
/// Without `--thread` the last project is resumed in a fresh thread. Ctrl-C
/// abandons the turn; the prompt stays saved without a reply.
pub async fn run<W: Write + Send>(
    state: &AppState,
    pipeline: &ConversationPipeline,
    thread: Option<i64>,
    prompt: &str,
    out: &mut W,
) -> Result<()> {
    let thread_id = match thread {
        Some(id) => {
            let mut ctx = SessionContext::default();
            ctx.select_thread(&state.store, &state.state_file, id)?.id
        }
        None => SessionContext::restore(&state.store, &state.state_file)?
            .thread_id
            .ok_or_else(|| anyhow!("No project selected; run `chatvault project select ID` first"))?,
    };

    let mut shown = 0;
    let turn = pipeline.run_turn(thread_id, prompt, |buffer| {
        let delta = &buffer[shown..];
        if let Err(e) = out.write_all(delta.as_bytes()).and_then(|_| out.flush()) {
            warn!(target: "chatvault::pipeline", "Failed to write reply chunk: {}", e);
        }
        shown = buffer.len();
    });

    let result = tokio::select! {
        result = turn => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    writeln!(out)?;

    let Some(result) = result else {
        bail!("Interrupted; the prompt was saved to thread {} without a reply", thread_id);
    };
    let outcome = result?;

    if let Some(name) = outcome.renamed_to {
        writeln!(out, "[thread {} is now '{}']", thread_id, name)?;
    }
    if outcome.skipped_history > 0 {
        writeln!(out, "[{} history messages were skipped]", outcome.skipped_history)?;
    }
    Ok(())
}
