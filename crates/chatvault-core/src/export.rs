//! Transcript and CSV exports.
//!
//! Both are side effects outside the chat transaction. Callers in the
//! conversation pipeline log failures and carry on.

use crate::db::ChatStore;
use crate::Result;
use chatvault_types::{ExportRow, Role};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Characters that are unsafe in file names on common platforms.
static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("valid regex"));

/// Replace path-hostile characters with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_PATH_CHARS.replace_all(name.trim(), "_");
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Append-only Markdown log, one file per thread, grouped by project.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    base_dir: PathBuf,
}

impl TranscriptLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `base_dir/<project>/<thread name> (<thread id>).md`
    pub fn thread_path(&self, project_name: &str, thread_id: i64, thread_name: &str) -> PathBuf {
        self.base_dir
            .join(sanitize_filename(project_name))
            .join(format!("{} ({}).md", sanitize_filename(thread_name), thread_id))
    }

    /// Append one message to the thread's transcript file.
    pub fn append(
        &self,
        project_name: &str,
        thread_id: i64,
        thread_name: &str,
        role: Role,
        content: &str,
    ) -> Result<PathBuf> {
        let path = self.thread_path(project_name, thread_id, thread_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        write!(
            file,
            "**[{}]** ({}):\n\n{}\n\n---\n\n",
            role.label(),
            timestamp,
            content
        )?;

        tracing::trace!(target: "chatvault::export", "Appended {} message to {}", role, path.display());
        Ok(path)
    }
}

/// Write rows as CSV, prefixed with a UTF-8 byte order mark so spreadsheet
/// tools detect the encoding. Returns the number of records written.
pub fn write_csv<W: Write>(rows: &[ExportRow], mut writer: W) -> Result<usize> {
    writer.write_all("\u{feff}".as_bytes())?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

/// Export every message in the store to a CSV file.
///
/// Writes nothing and returns `Ok(0)` when the store has no messages.
pub fn export_csv(store: &ChatStore, path: &Path) -> Result<usize> {
    let rows = store.export_rows()?;
    if rows.is_empty() {
        tracing::info!(target: "chatvault::export", "Nothing to export");
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let written = write_csv(&rows, std::io::BufWriter::new(file))?;

    tracing::info!(target: "chatvault::export", "Exported {} messages to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatvault_types::NewProject;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_filename("what? <yes>|no*"), "what_ _yes__no_");
        assert_eq!(sanitize_filename("日本語のスレッド"), "日本語のスレッド");
        assert_eq!(sanitize_filename("  "), "_");
        assert_eq!(sanitize_filename(".."), "_");
    }

    #[test]
    fn test_transcript_append() {
        let dir = TempDir::new().unwrap();
        let log = TranscriptLog::new(dir.path());

        let path = log
            .append("My/Project", 7, "Hello world", Role::User, "Question?")
            .unwrap();
        log.append("My/Project", 7, "Hello world", Role::Assistant, "Answer.")
            .unwrap();

        assert_eq!(path, dir.path().join("My_Project").join("Hello world (7).md"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("**[User]** ("));
        assert!(text.contains("Question?\n\n---\n\n**[Assistant]** ("));
        assert!(text.ends_with("Answer.\n\n---\n\n"));
    }

    #[test]
    fn test_write_csv() {
        let store = ChatStore::open_in_memory().unwrap();
        let project = store.create_project(&NewProject::new("P", "sys")).unwrap();
        let thread = store.create_thread(project.id, None).unwrap();
        store.append_message(thread.id, Role::User, "hello, \"world\"").unwrap();

        let mut out = Vec::new();
        let written = write_csv(&store.export_rows().unwrap(), &mut out).unwrap();
        assert_eq!(written, 1);

        let text = String::from_utf8(out).unwrap();
        let text = text.strip_prefix('\u{feff}').unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("project_id,project_name,project_system_prompt"));
        assert!(lines.next().unwrap().contains("\"hello, \"\"world\"\"\""));
    }

    #[test]
    fn test_export_csv_skips_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = ChatStore::open_in_memory().unwrap();
        let path = dir.path().join("out.csv");

        assert_eq!(export_csv(&store, &path).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_export_csv_writes_file() {
        let dir = TempDir::new().unwrap();
        let store = ChatStore::open_in_memory().unwrap();
        let project = store.create_project(&NewProject::new("P", "")).unwrap();
        let thread = store.create_thread(project.id, None).unwrap();
        store.append_message(thread.id, Role::User, "a").unwrap();
        store.append_message(thread.id, Role::Assistant, "b").unwrap();

        let path = dir.path().join("exports").join("all.csv");
        assert_eq!(export_csv(&store, &path).unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
