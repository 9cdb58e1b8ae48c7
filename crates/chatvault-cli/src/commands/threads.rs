//! `chatvault thread ...`

use super::{current_project, local_time};
use crate::cli::ThreadCommand;
use crate::state::AppState;
use anyhow::Result;
use chatvault_core::ChatError;
use std::io::Write;

pub fn run<W: Write>(state: &AppState, cmd: ThreadCommand, out: &mut W) -> Result<()> {
    let store = &state.store;

    match cmd {
        ThreadCommand::List { project } => {
            let project_id = current_project(state, project)?;
            if store.get_project(project_id)?.is_none() {
                return Err(ChatError::ProjectNotFound(project_id).into());
            }
            for summary in store.list_threads(project_id)? {
                writeln!(
                    out,
                    "{:>4}  {}  ({} messages, {})",
                    summary.thread.id,
                    summary.thread.name,
                    summary.message_count,
                    local_time(&summary.thread.updated_at)
                )?;
            }
        }
        ThreadCommand::New { project, name } => {
            let project_id = current_project(state, project)?;
            let thread = store.create_thread(project_id, name.as_deref())?;
            writeln!(out, "Created thread {} '{}'", thread.id, thread.name)?;
        }
        ThreadCommand::Show { id } => {
            let Some(thread) = store.get_thread(id)? else {
                return Err(ChatError::ThreadNotFound(id).into());
            };
            writeln!(out, "# {}", thread.name)?;
            for message in store.list_messages(id)? {
                writeln!(
                    out,
                    "\n[{}] {}\n{}",
                    message.role.label(),
                    local_time(&message.created_at),
                    message.content
                )?;
            }
        }
        ThreadCommand::Rename { id, name } => {
            let thread = store.rename_thread(id, &name)?;
            writeln!(out, "Renamed thread {} to '{}'", thread.id, thread.name)?;
        }
        ThreadCommand::Delete { id } => {
            if !store.delete_thread(id)? {
                return Err(ChatError::ThreadNotFound(id).into());
            }
            writeln!(out, "Deleted thread {}", id)?;
        }
        ThreadCommand::Prune { project, keep } => {
            let project_id = current_project(state, project)?;
            let removed = store.delete_empty_threads(project_id, keep)?;
            writeln!(out, "Removed {} empty threads", removed)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{output, state};
    use chatvault_core::SessionState;
    use chatvault_types::{NewProject, Role};

    #[test]
    fn test_list_uses_selected_project() {
        let (state, _dir) = state();
        let project = state.store.create_project(&NewProject::new("P", "")).unwrap();
        let thread = state.store.create_thread(project.id, Some("Chat about Rust")).unwrap();
        state.store.append_message(thread.id, Role::User, "hi").unwrap();

        let mut out = Vec::new();
        assert!(run(&state, ThreadCommand::List { project: None }, &mut out).is_err());

        state
            .state_file
            .save(&SessionState { last_project_id: Some(project.id) })
            .unwrap();
        run(&state, ThreadCommand::List { project: None }, &mut out).unwrap();
        assert!(output(out).contains("Chat about Rust  (1 messages"));
    }

    #[test]
    fn test_show_rename_delete() {
        let (state, _dir) = state();
        let project = state.store.create_project(&NewProject::new("P", "")).unwrap();
        let thread = state.store.create_thread(project.id, None).unwrap();
        state.store.append_message(thread.id, Role::User, "question").unwrap();
        state.store.append_message(thread.id, Role::Assistant, "answer").unwrap();

        let mut out = Vec::new();
        run(&state, ThreadCommand::Rename { id: thread.id, name: "Renamed".into() }, &mut out).unwrap();
        run(&state, ThreadCommand::Show { id: thread.id }, &mut out).unwrap();
        run(&state, ThreadCommand::Delete { id: thread.id }, &mut out).unwrap();

        let text = output(out);
        assert!(text.contains("# Renamed"));
        assert!(text.contains("[User]"));
        assert!(text.contains("answer"));
        assert!(state.store.get_thread(thread.id).unwrap().is_none());

        let mut out = Vec::new();
        assert!(run(&state, ThreadCommand::Show { id: thread.id }, &mut out).is_err());
    }

    #[test]
    fn test_prune_keeps_requested_thread() {
        let (state, _dir) = state();
        let project = state.store.create_project(&NewProject::new("P", "")).unwrap();
        let keep = state.store.create_thread(project.id, None).unwrap();
        state.store.create_thread(project.id, None).unwrap();

        let mut out = Vec::new();
        run(
            &state,
            ThreadCommand::Prune { project: Some(project.id), keep: Some(keep.id) },
            &mut out,
        )
        .unwrap();

        assert!(output(out).contains("Removed 1 empty threads"));
        assert!(state.store.get_thread(keep.id).unwrap().is_some());
    }
}
