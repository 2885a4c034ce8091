//! Output formatting

use serde::Serialize;

use crate::container::{CreatedContainer, DeletedContainer, StartedContainer};
use crate::diagnostics::{Diagnostic, Outcome};
use crate::fs::FileNode;
use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::runtime::ContainerSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Result of one CLI command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CommandResult {
    Image(String),
    Created(CreatedContainer),
    Started(StartedContainer),
    Stopped(String),
    Deleted(DeletedContainer),
    Containers(Vec<ContainerSummary>),
    Tree(Vec<FileNode>),
    Content(String),
    Written { path: String, bytes: u64 },
    Renamed { from: String, to: String },
    Removed(String),
}

/// A command result together with any advisory failures
#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub result: CommandResult,
    pub diagnostics: Vec<Diagnostic>,
}

impl From<CommandResult> for CommandReport {
    fn from(result: CommandResult) -> Self {
        Self {
            result,
            diagnostics: Vec::new(),
        }
    }
}

impl CommandReport {
    pub fn from_outcome<T>(outcome: Outcome<T>, wrap: impl FnOnce(T) -> CommandResult) -> Self {
        Self {
            result: wrap(outcome.value),
            diagnostics: outcome.diagnostics,
        }
    }
}

pub fn format_output(report: &CommandReport, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}
