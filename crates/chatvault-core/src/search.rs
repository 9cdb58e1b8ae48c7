//! Keyword search over message content.
//!
//! Every message has a row in `message_search` holding its content folded to
//! lowercase. A query is split on whitespace and a message matches when its
//! folded content contains every folded term as a substring. There is no
//! tokenizer, so scripts without word separators match the same way as
//! space-delimited ones.
//!
//! The index rows are written by the store in the same transaction as the
//! message mutation they mirror.

use crate::db::{row_to_message, ChatStore};
use crate::{ChatError, Result};
use chatvault_types::{IndexHealth, Message, SearchHit, MISSING_LABEL};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashSet;

/// Terms past this many are matched in Rust against the folded text.
/// SQLite rejects expression trees deeper than 1000 nodes.
const SQL_TERM_LIMIT: usize = 8;

/// Fold text for case-insensitive matching.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// Split a query into folded, non-empty, distinct terms in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(fold)
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

/// Insert or refresh the index row for a message.
pub(crate) fn index_message(conn: &Connection, message_id: i64, content: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO message_search (message_id, folded) VALUES (?1, ?2)",
        params![message_id, fold(content)],
    )?;
    Ok(())
}

/// Remove the index row for a message.
pub(crate) fn unindex_message(conn: &Connection, message_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM message_search WHERE message_id = ?1",
        params![message_id],
    )?;
    Ok(())
}

/// Drop index rows whose message no longer exists. Returns rows removed.
pub(crate) fn resync_index(conn: &Connection) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM message_search WHERE message_id NOT IN (SELECT id FROM messages)",
        [],
    )?;
    Ok(removed)
}

/// `instr(s.folded, ?1) > 0 AND instr(s.folded, ?2) > 0 ...`
fn match_clause(term_count: usize) -> String {
    (1..=term_count)
        .map(|i| format!("instr(s.folded, ?{i}) > 0"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

impl ChatStore {
    /// Messages containing every term of `query`, in creation order.
    ///
    /// An empty or whitespace-only query returns no results.
    pub fn search_messages(&self, query: &str) -> Result<Vec<Message>> {
        Ok(self.search(query)?.into_iter().map(|hit| hit.message).collect())
    }

    /// Like [`search_messages`](Self::search_messages), with each message
    /// labelled by its thread and project.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let (sql_terms, rest) = terms.split_at(terms.len().min(SQL_TERM_LIMIT));

        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT
                m.id, m.thread_id, m.role, m.content, m.created_at,
                t.id AS hit_thread_id, t.name AS hit_thread_name,
                p.id AS hit_project_id, p.name AS hit_project_name,
                s.folded AS hit_folded
            FROM message_search s
            JOIN messages m ON m.id = s.message_id
            LEFT JOIN threads t ON t.id = m.thread_id
            LEFT JOIN projects p ON p.id = t.project_id
            WHERE {}
            ORDER BY m.id
            "#,
            match_clause(sql_terms.len())
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(sql_terms.iter()), |row| {
            let message = row_to_message(row)?;
            let thread_id: Option<i64> = row.get("hit_thread_id")?;
            let thread_name: Option<String> = row.get("hit_thread_name")?;
            let project_id: Option<i64> = row.get("hit_project_id")?;
            let project_name: Option<String> = row.get("hit_project_name")?;
            let folded: String = row.get("hit_folded")?;
            let hit = SearchHit {
                message,
                thread_id,
                thread_name: thread_name.unwrap_or_else(|| MISSING_LABEL.to_string()),
                project_id,
                project_name: project_name.unwrap_or_else(|| MISSING_LABEL.to_string()),
            };
            Ok((hit, folded))
        })?;

        // A row that fails to decode is dropped rather than failing the search
        let mut hits = Vec::new();
        for row in rows {
            match row {
                Ok((hit, folded)) => {
                    if rest.iter().all(|term| folded.contains(term.as_str())) {
                        hits.push(hit);
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "chatvault::search", "Skipping undecodable search hit: {}", e)
                }
            }
        }

        tracing::debug!(
            target: "chatvault::search",
            terms = terms.len(),
            hits = hits.len(),
            "Searched messages"
        );
        Ok(hits)
    }

    /// Compare the search index against the messages table.
    pub fn check_search_index(&self) -> Result<IndexHealth> {
        let conn = self.lock()?;
        index_health(&conn)
    }

    /// Fail with `IndexSync` if the search index has drifted.
    pub fn verify_search_index(&self) -> Result<IndexHealth> {
        let health = self.check_search_index()?;
        if !health.is_consistent() {
            return Err(ChatError::IndexSync(format!(
                "{} missing, {} stale of {} messages",
                health.missing, health.stale, health.messages
            )));
        }
        Ok(health)
    }

    /// Recreate every index row from the messages table.
    ///
    /// Returns the number of messages indexed.
    pub fn rebuild_search_index(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM message_search", [])?;
        let messages = {
            let mut stmt = tx.prepare("SELECT id, content FROM messages")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        for (id, content) in &messages {
            index_message(&tx, *id, content)?;
        }
        tx.commit()?;

        tracing::info!(target: "chatvault::search", "Rebuilt search index ({} messages)", messages.len());
        Ok(messages.len())
    }

    /// Rebuild the index if it has drifted. Called when the store is opened.
    pub(crate) fn ensure_search_index(&self) -> Result<()> {
        let health = self.check_search_index()?;
        if !health.is_consistent() {
            tracing::warn!(
                target: "chatvault::search",
                missing = health.missing,
                stale = health.stale,
                "Search index out of sync, rebuilding"
            );
            self.rebuild_search_index()?;
        }
        Ok(())
    }
}

fn index_health(conn: &Connection) -> Result<IndexHealth> {
    let indexed: i64 = conn.query_row("SELECT COUNT(*) FROM message_search", [], |row| row.get(0))?;
    let orphaned: i64 = conn.query_row(
        "SELECT COUNT(*) FROM message_search WHERE message_id NOT IN (SELECT id FROM messages)",
        [],
        |row| row.get(0),
    )?;

    let mut health = IndexHealth {
        indexed: indexed as u64,
        stale: orphaned as u64,
        ..IndexHealth::default()
    };

    let mut stmt = conn.prepare(
        r#"
        SELECT m.content, s.folded
        FROM messages m
        LEFT JOIN message_search s ON s.message_id = m.id
        "#,
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        health.messages += 1;
        let content: String = row.get(0)?;
        match row.get::<_, Option<String>>(1)? {
            None => health.missing += 1,
            Some(folded) if folded != fold(&content) => health.stale += 1,
            Some(_) => {}
        }
    }

    Ok(health)
}
