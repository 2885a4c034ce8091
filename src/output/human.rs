//! Human-readable output formatting

use crate::fs::FileNode;
use crate::output::formatter::{CommandReport, CommandResult};
use bytesize::ByteSize;

pub fn format_human(report: &CommandReport) -> String {
    let output = match &report.result {
        CommandResult::Image(image) => format!("Built image {}", image),
        CommandResult::Created(created) => {
            format!(
                "Container Created\n\
                 -----------------\n\
                 Id:    {}\n\
                 Name:  {}\n\
                 Port:  {}",
                created.id, created.name, created.port
            )
        }
        CommandResult::Started(started) => {
            if started.started {
                format!("Started on port {}", started.port)
            } else {
                format!("Already running on port {}", started.port)
            }
        }
        CommandResult::Stopped(id) => format!("Stopped {}", id),
        CommandResult::Deleted(deleted) => {
            let mut output = String::from("Deleted container");
            if deleted.was_running {
                output.push_str(" (stopped first)");
            }
            if let Some(port) = deleted.released_port {
                output.push_str(&format!("\n  Released port: {}", port));
            }
            if let Some(ref image) = deleted.image_removed {
                output.push_str(&format!("\n  Removed image: {}", image));
            }
            output
        }
        CommandResult::Containers(containers) => {
            if containers.is_empty() {
                return with_diagnostics("No containers found".to_string(), report);
            }
            let mut output = format!(
                "{:<14} {:<28} {:<10} {:<6} {}\n",
                "ID", "NAME", "STATE", "PORT", "CREATED"
            );
            output.push_str(&"-".repeat(80));
            for container in containers {
                output.push_str(&format!(
                    "\n{:<14} {:<28} {:<10} {:<6} {}",
                    short_id(&container.id),
                    container.name,
                    container.state,
                    container
                        .host_port()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    container
                        .created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string())
                ));
            }
            output
        }
        CommandResult::Tree(forest) => {
            if forest.is_empty() {
                return with_diagnostics("(empty)".to_string(), report);
            }
            let mut output = String::new();
            render_forest(forest, "", &mut output);
            output.trim_end().to_string()
        }
        CommandResult::Content(content) => content.clone(),
        CommandResult::Written { path, bytes } => {
            format!("Wrote {} to {}", ByteSize(*bytes), path)
        }
        CommandResult::Renamed { from, to } => format!("Moved {} -> {}", from, to),
        CommandResult::Removed(path) => format!("Removed {}", path),
    };

    with_diagnostics(output, report)
}

fn with_diagnostics(mut output: String, report: &CommandReport) -> String {
    for diagnostic in &report.diagnostics {
        output.push_str(&format!("\nWarning: {}", diagnostic));
    }
    output
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn render_forest(nodes: &[FileNode], prefix: &str, output: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let branch = if last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push_str(&node.name);
        if node.is_dir() {
            output.push('/');
        }
        if let Some(ref content) = node.content {
            output.push_str(&format!(" ({})", ByteSize(content.len() as u64)));
        }
        output.push('\n');

        if let Some(ref children) = node.children {
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            render_forest(children, &child_prefix, output);
        }
    }
}
