//! Cascading deletes and maintenance sweeps.
//!
//! Children are always removed before parents (messages, then threads, then
//! the project) inside a single transaction per aggregate root. Any failure
//! drops the transaction, which rolls the whole cascade back.

use crate::db::{project_by_id, thread_by_id, ChatStore};
use crate::search;
use crate::{ChatError, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

impl ChatStore {
    /// Delete a thread and all of its messages.
    ///
    /// Messages are removed one at a time together with their index rows.
    /// Returns `Ok(false)` if the thread does not exist.
    pub fn delete_thread(&self, thread_id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if thread_by_id(&tx, thread_id)?.is_none() {
            return Ok(false);
        }

        let message_ids = message_ids_in_thread(&tx, thread_id)?;
        for id in &message_ids {
            search::unindex_message(&tx, *id)?;
            tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        }
        tx.execute("DELETE FROM threads WHERE id = ?1", params![thread_id])?;
        tx.commit()?;

        info!(
            target: "chatvault::lifecycle",
            thread_id,
            messages = message_ids.len(),
            "Deleted thread"
        );
        Ok(true)
    }

    /// Delete a project with all of its threads and messages.
    ///
    /// Returns `Ok(false)` if the project does not exist.
    pub fn delete_project(&self, project_id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if project_by_id(&tx, project_id)?.is_none() {
            return Ok(false);
        }

        let (messages, threads) = purge_project_threads(&tx, project_id)?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
        tx.commit()?;

        info!(
            target: "chatvault::lifecycle",
            project_id,
            threads,
            messages,
            "Deleted project"
        );
        Ok(true)
    }

    /// Delete every thread in a project, keeping the project itself.
    ///
    /// Returns the number of threads removed; an empty project is a
    /// successful no-op.
    pub fn delete_all_threads_in_project(&self, project_id: i64) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if project_by_id(&tx, project_id)?.is_none() {
            return Err(ChatError::ProjectNotFound(project_id));
        }

        let (messages, threads) = purge_project_threads(&tx, project_id)?;
        tx.commit()?;

        info!(
            target: "chatvault::lifecycle",
            project_id,
            threads,
            messages,
            "Deleted all threads in project"
        );
        Ok(threads)
    }

    /// Delete threads in a project that have no messages.
    ///
    /// `exclude_thread_id` is never deleted, so a thread created by the same
    /// action that triggers the sweep survives it. Returns the number of
    /// threads removed.
    pub fn delete_empty_threads(
        &self,
        project_id: i64,
        exclude_thread_id: Option<i64>,
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let empty: Vec<i64> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT t.id
                FROM threads t
                LEFT JOIN messages m ON m.thread_id = t.id
                WHERE t.project_id = ?1
                  AND m.id IS NULL
                  AND (?2 IS NULL OR t.id != ?2)
                "#,
            )?;
            let rows = stmt
                .query_map(params![project_id, exclude_thread_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        if empty.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        for id in &empty {
            deleted += tx.execute("DELETE FROM threads WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        debug!(
            target: "chatvault::lifecycle",
            project_id,
            ?exclude_thread_id,
            deleted,
            "Swept empty threads"
        );
        Ok(deleted)
    }

    /// Sweep empty threads, logging failures and reporting them as zero.
    pub fn prune_empty_threads(&self, project_id: i64, exclude_thread_id: Option<i64>) -> usize {
        match self.delete_empty_threads(project_id, exclude_thread_id) {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    target: "chatvault::lifecycle",
                    project_id,
                    "Empty thread sweep failed: {}", e
                );
                0
            }
        }
    }
}

fn message_ids_in_thread(conn: &Connection, thread_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM messages WHERE thread_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![thread_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Bulk-delete a project's messages and threads, then drop orphaned index
/// rows. Returns `(messages, threads)` removed.
fn purge_project_threads(conn: &Connection, project_id: i64) -> Result<(usize, usize)> {
    let messages = conn.execute(
        "DELETE FROM messages WHERE thread_id IN (SELECT id FROM threads WHERE project_id = ?1)",
        params![project_id],
    )?;
    let unindexed = search::resync_index(conn)?;
    if unindexed != messages {
        warn!(
            target: "chatvault::lifecycle",
            project_id,
            messages,
            unindexed,
            "Index row count differed from deleted messages"
        );
    }
    let threads = conn.execute(
        "DELETE FROM threads WHERE project_id = ?1",
        params![project_id],
    )?;
    Ok((messages, threads))
}
