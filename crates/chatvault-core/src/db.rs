//! SQLite persistence for projects, threads and messages.
//!
//! Foreign keys are enforced but declared without `ON DELETE CASCADE`; callers
//! that remove a parent must delete its children first (see `lifecycle`).
//! Every mutation runs inside its own transaction.

use crate::search;
use crate::{ChatError, Result};
use chatvault_types::{
    ExportRow, Message, NewProject, Project, Role, StorageStats, Thread, ThreadSummary,
    DEFAULT_THREAD_NAME,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed chat history store.
pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!(target: "chatvault::db", "Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, initialising schema and search index.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        store.migrate()?;
        store.ensure_search_index()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ChatError::LockPoisoned)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                system_prompt TEXT NOT NULL,
                model_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id),
                name TEXT NOT NULL DEFAULT 'New Thread',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_threads_project_id ON threads(project_id);
            CREATE INDEX IF NOT EXISTS idx_threads_updated_at ON threads(updated_at);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id INTEGER NOT NULL REFERENCES threads(id),
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id, created_at);

            -- Lowercased copy of messages.content, maintained by the store itself
            CREATE TABLE IF NOT EXISTS message_search (
                message_id INTEGER PRIMARY KEY,
                folded TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Run migrations for schema updates.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;

        // Older databases kept an FTS5 index in sync through row triggers. Those
        // triggers would fire on our deletes, so drop them along with the table.
        let has_legacy_fts: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = 'message_fts'",
            [],
            |row| row.get(0),
        )?;

        if has_legacy_fts {
            tracing::info!(target: "chatvault::db", "Dropping legacy FTS5 message index");
            conn.execute_batch(
                r#"
                DROP TRIGGER IF EXISTS message_ai;
                DROP TRIGGER IF EXISTS message_ad;
                DROP TRIGGER IF EXISTS message_au;
                DROP TABLE IF EXISTS message_fts;
                "#,
            )?;
        }

        Ok(())
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Create a project. Fails with `DuplicateName` if the name is taken.
    pub fn create_project(&self, new: &NewProject) -> Result<Project> {
        let name = validate_name(&new.name, "Project name")?;
        let model = validate_name(new.model_or_default(), "Model name")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if project_id_by_name(&tx, name)?.is_some() {
            return Err(ChatError::DuplicateName(name.to_string()));
        }

        let now = now();
        tx.execute(
            r#"
            INSERT INTO projects (name, system_prompt, model_name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![name, new.system_prompt, model, format_ts(&now)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(target: "chatvault::db", project_id = id, "Created project '{}'", name);
        Ok(Project {
            id,
            name: name.to_string(),
            system_prompt: new.system_prompt.clone(),
            model_name: model.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a project by ID.
    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.lock()?;
        project_by_id(&conn, id)
    }

    /// Get a project by its unique name.
    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let project = conn
            .query_row(
                "SELECT * FROM projects WHERE name = ?1",
                params![name.trim()],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// List all projects, ordered by name.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY name")?;
        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Update a project's name and system prompt.
    ///
    /// Fails if the project is missing, or if the new name belongs to a
    /// different project. Nothing is changed on failure.
    pub fn update_project(
        &self,
        id: i64,
        new_name: &str,
        new_system_prompt: &str,
    ) -> Result<Project> {
        let name = validate_name(new_name, "Project name")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = project_by_id(&tx, id)?.ok_or(ChatError::ProjectNotFound(id))?;
        if name != current.name {
            if let Some(other) = project_id_by_name(&tx, name)? {
                if other != id {
                    return Err(ChatError::DuplicateName(name.to_string()));
                }
            }
        }

        let updated_at = bump(current.updated_at);
        tx.execute(
            "UPDATE projects SET name = ?1, system_prompt = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, new_system_prompt, format_ts(&updated_at), id],
        )?;
        tx.commit()?;

        tracing::info!(target: "chatvault::db", project_id = id, "Updated project '{}'", name);
        Ok(Project {
            name: name.to_string(),
            system_prompt: new_system_prompt.to_string(),
            updated_at,
            ..current
        })
    }

    /// Change the generation model a project uses.
    pub fn set_project_model(&self, id: i64, model: &str) -> Result<()> {
        let model = validate_name(model, "Model name")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let current = project_by_id(&tx, id)?.ok_or(ChatError::ProjectNotFound(id))?;
        tx.execute(
            "UPDATE projects SET model_name = ?1, updated_at = ?2 WHERE id = ?3",
            params![model, format_ts(&bump(current.updated_at)), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Create a thread under a project. `None` uses the default name.
    pub fn create_thread(&self, project_id: i64, name: Option<&str>) -> Result<Thread> {
        let name = match name {
            Some(name) => validate_name(name, "Thread name")?,
            None => DEFAULT_THREAD_NAME,
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if project_by_id(&tx, project_id)?.is_none() {
            return Err(ChatError::ProjectNotFound(project_id));
        }

        let now = now();
        tx.execute(
            r#"
            INSERT INTO threads (project_id, name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
            params![project_id, name, format_ts(&now)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::debug!(target: "chatvault::db", thread_id = id, project_id, "Created thread");
        Ok(Thread {
            id,
            project_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a thread by ID.
    pub fn get_thread(&self, id: i64) -> Result<Option<Thread>> {
        let conn = self.lock()?;
        thread_by_id(&conn, id)
    }

    /// List a project's threads, most recently updated first.
    pub fn list_threads(&self, project_id: i64) -> Result<Vec<ThreadSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                t.*,
                (SELECT COUNT(*) FROM messages WHERE thread_id = t.id) as message_count
            FROM threads t
            WHERE t.project_id = ?1
            ORDER BY t.updated_at DESC, t.id DESC
            "#,
        )?;
        let threads = stmt
            .query_map(params![project_id], |row| {
                let thread = row_to_thread(row)?;
                let message_count: i64 = row.get("message_count")?;
                Ok(ThreadSummary {
                    thread,
                    message_count: message_count as u32,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(threads)
    }

    /// Rename a thread and bump its `updated_at`.
    pub fn rename_thread(&self, id: i64, new_name: &str) -> Result<Thread> {
        let name = validate_name(new_name, "Thread name")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = thread_by_id(&tx, id)?.ok_or(ChatError::ThreadNotFound(id))?;
        let updated_at = bump(current.updated_at);
        tx.execute(
            "UPDATE threads SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, format_ts(&updated_at), id],
        )?;
        tx.commit()?;

        tracing::debug!(target: "chatvault::db", thread_id = id, "Renamed thread to '{}'", name);
        Ok(Thread {
            name: name.to_string(),
            updated_at,
            ..current
        })
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Append a message to a thread.
    ///
    /// The message row, its search index entry and the thread's `updated_at`
    /// bump are committed together.
    pub fn append_message(&self, thread_id: i64, role: Role, content: &str) -> Result<Message> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let thread = thread_by_id(&tx, thread_id)?.ok_or(ChatError::ThreadNotFound(thread_id))?;

        let created_at = now();
        tx.execute(
            r#"
            INSERT INTO messages (thread_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![thread_id, role.as_str(), content, format_ts(&created_at)],
        )?;
        let id = tx.last_insert_rowid();
        search::index_message(&tx, id, content)?;

        tx.execute(
            "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
            params![format_ts(&bump(thread.updated_at.max(created_at))), thread_id],
        )?;
        tx.commit()?;

        tracing::debug!(
            target: "chatvault::db",
            message_id = id,
            thread_id,
            role = role.as_str(),
            "Appended message ({} chars)",
            content.chars().count()
        );
        Ok(Message {
            id,
            thread_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Get a message by ID.
    pub fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let conn = self.lock()?;
        let message = conn
            .query_row(
                "SELECT * FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// List a thread's messages in creation order.
    pub fn list_messages(&self, thread_id: i64) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM messages WHERE thread_id = ?1 ORDER BY created_at, id")?;
        let messages = stmt
            .query_map(params![thread_id], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// List a thread's messages without interpreting the role column.
    ///
    /// Used when assembling generation history, where rows that do not decode
    /// are skipped rather than failing the whole turn.
    pub(crate) fn list_raw_messages(&self, thread_id: i64) -> Result<Vec<RawMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, role, content FROM messages WHERE thread_id = ?1 ORDER BY created_at, id",
        )?;
        let messages = stmt
            .query_map(params![thread_id], |row| {
                Ok(RawMessage {
                    id: row.get(0)?,
                    role: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    content: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Number of messages in a thread.
    pub fn count_messages(&self, thread_id: i64) -> Result<u32> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Replace a message's content, keeping the search index in step.
    pub fn update_message_content(&self, id: i64, content: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE messages SET content = ?1 WHERE id = ?2",
            params![content, id],
        )?;
        if updated == 0 {
            return Err(ChatError::MessageNotFound(id));
        }
        search::index_message(&tx, id, content)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a single message and its index entry.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        search::unindex_message(&tx, id)?;
        let deleted = tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Export & statistics
    // =========================================================================

    /// Every message joined with its thread and project, for tabular export.
    pub fn export_rows(&self) -> Result<Vec<ExportRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                p.id AS project_id,
                p.name AS project_name,
                p.system_prompt AS project_system_prompt,
                p.created_at AS project_created_at,
                t.id AS thread_id,
                t.name AS thread_name,
                t.created_at AS thread_created_at,
                m.id AS message_id,
                m.role AS message_role,
                m.content AS message_content,
                m.created_at AS message_created_at
            FROM projects p
            JOIN threads t ON p.id = t.project_id
            JOIN messages m ON t.id = m.thread_id
            ORDER BY p.id, t.id, m.created_at, m.id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExportRow {
                    project_id: row.get("project_id")?,
                    project_name: row.get("project_name")?,
                    project_system_prompt: row.get("project_system_prompt")?,
                    project_created_at: parse_ts(&row.get::<_, String>("project_created_at")?),
                    thread_id: row.get("thread_id")?,
                    thread_name: row.get("thread_name")?,
                    thread_created_at: parse_ts(&row.get::<_, String>("thread_created_at")?),
                    message_id: row.get("message_id")?,
                    message_role: row.get("message_role")?,
                    message_content: row.get("message_content")?,
                    message_created_at: parse_ts(&row.get::<_, String>("message_created_at")?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get row counts.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(StorageStats {
            project_count: count("projects")?,
            thread_count: count("threads")?,
            message_count: count("messages")?,
        })
    }
}

/// A message row as stored, before role decoding.
#[derive(Debug, Clone)]
pub(crate) struct RawMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
}

// =============================================================================
// Shared query helpers (usable with a Connection or a Transaction)
// =============================================================================

pub(crate) fn project_by_id(conn: &Connection, id: i64) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT * FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

fn project_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM projects WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub(crate) fn thread_by_id(conn: &Connection, id: i64) -> Result<Option<Thread>> {
    let thread = conn
        .query_row(
            "SELECT * FROM threads WHERE id = ?1",
            params![id],
            row_to_thread,
        )
        .optional()?;
    Ok(thread)
}

fn validate_name<'a>(name: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        system_prompt: row.get("system_prompt")?,
        model_name: row.get("model_name")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn row_to_thread(row: &rusqlite::Row) -> rusqlite::Result<Thread> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Thread {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

pub(crate) fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get("role")?;
    let role = role.parse::<Role>().map_err(|e| {
        let idx = row.as_ref().column_index("role").unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })?;
    let created_at: String = row.get("created_at")?;

    Ok(Message {
        id: row.get("id")?,
        thread_id: row.get("thread_id")?,
        role,
        content: row.get("content")?,
        created_at: parse_ts(&created_at),
    })
}

// =============================================================================
// Timestamps
// =============================================================================

/// Current time at the precision we persist.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A timestamp strictly after `previous`, normally the current time.
pub(crate) fn bump(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous {
        now
    } else {
        previous + TimeDelta::microseconds(1)
    }
}

/// Fixed-width RFC 3339, so lexical order matches chronological order.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form written by older databases.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc()))
        .unwrap_or_default()
}
