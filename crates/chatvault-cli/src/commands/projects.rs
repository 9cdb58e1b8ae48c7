//! `chatvault project ...`

use crate::cli::ProjectCommand;
use crate::state::AppState;
use anyhow::{bail, Result};
use chatvault_core::{ChatError, SessionContext};
use chatvault_types::NewProject;
use std::io::Write;
use tracing::info;

pub fn run<W: Write>(state: &AppState, cmd: ProjectCommand, out: &mut W) -> Result<()> {
    let store = &state.store;
    let mut ctx = SessionContext {
        project_id: state.state_file.load().last_project_id,
        thread_id: None,
    };

    match cmd {
        ProjectCommand::List => {
            let projects = store.list_projects()?;
            if projects.is_empty() {
                writeln!(out, "No projects yet. Create one with `chatvault project create NAME`.")?;
            }
            for project in projects {
                let marker = if ctx.project_id == Some(project.id) { '*' } else { ' ' };
                writeln!(out, "{} {:>4}  {}  ({})", marker, project.id, project.name, project.model_name)?;
            }
        }
        ProjectCommand::Create { name, prompt, model } => {
            let new = NewProject::new(
                name,
                prompt.unwrap_or_else(|| state.config.default_system_prompt.clone()),
            )
            .with_model(model.unwrap_or_else(|| state.config.default_model.clone()));

            let project = store.create_project(&new)?;
            ctx.select_project(store, &state.state_file, project.id)?;
            writeln!(out, "Created project {} '{}'", project.id, project.name)?;
        }
        ProjectCommand::Select { id } => {
            let project = ctx.select_project(store, &state.state_file, id)?;
            writeln!(out, "Selected project {} '{}'", project.id, project.name)?;
        }
        ProjectCommand::Update { id, name, prompt } => {
            if name.is_none() && prompt.is_none() {
                bail!("Nothing to update; pass --name and/or --prompt");
            }
            let Some(current) = store.get_project(id)? else {
                return Err(ChatError::ProjectNotFound(id).into());
            };
            let project = store.update_project(
                id,
                name.as_deref().unwrap_or(&current.name),
                prompt.as_deref().unwrap_or(&current.system_prompt),
            )?;
            writeln!(out, "Updated project {} '{}'", project.id, project.name)?;
        }
        ProjectCommand::Model { id, model } => {
            store.set_project_model(id, &model)?;
            writeln!(out, "Project {} now uses {}", id, model.trim())?;
        }
        ProjectCommand::Delete { id } => {
            if !store.delete_project(id)? {
                return Err(ChatError::ProjectNotFound(id).into());
            }
            ctx.forget_project(&state.state_file, id);
            info!(target: "chatvault::lifecycle", project_id = id, "Project deleted from CLI");
            writeln!(out, "Deleted project {}", id)?;
        }
        ProjectCommand::Clear { id } => {
            let removed = store.delete_all_threads_in_project(id)?;
            writeln!(out, "Deleted {} threads from project {}", removed, id)?;
        }
    }

    Ok(())
}
