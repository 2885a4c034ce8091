//! CLI argument parsing

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "sessionbox")]
#[command(author, version, about = "Manage per-session application sandboxes", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// Settings overridable from flags or the environment
#[derive(ClapArgs, Debug, Clone)]
pub struct SettingsArgs {
    /// Container runtime binary
    #[arg(long, global = true, env = "SESSIONBOX_RUNTIME", default_value = "docker")]
    pub runtime: String,

    /// Prefix for image and container names
    #[arg(long, global = true, env = "SESSIONBOX_PREFIX", default_value = "sessionbox")]
    pub prefix: String,

    /// First host port to allocate from
    #[arg(long, global = true, env = "SESSIONBOX_BASE_PORT", default_value = "3001")]
    pub base_port: u16,

    /// Image definition file used for builds
    #[arg(long, global = true, env = "SESSIONBOX_DOCKERFILE", default_value = "Dockerfile")]
    pub dockerfile: PathBuf,

    /// Directory inside containers that relative paths resolve against
    #[arg(long, global = true, env = "SESSIONBOX_WORKSPACE", default_value = "/app")]
    pub workspace: String,
}

impl SettingsArgs {
    pub fn to_settings(&self) -> Settings {
        Settings {
            runtime: self.runtime.clone(),
            name_prefix: self.prefix.clone(),
            project_label: self.prefix.clone(),
            base_port: self.base_port,
            dockerfile: self.dockerfile.to_string_lossy().to_string(),
            workspace_dir: self.workspace.clone(),
            ..Settings::default()
        }
    }
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Build the image for a session
    Build {
        /// Session identifier
        session: String,
    },

    /// Create and start a container from an image
    Create {
        /// Image to run
        image: String,
        /// Session identifier
        session: String,
    },

    /// Start a container (no-op if already running)
    Start {
        /// Container id or name
        id: String,
    },

    /// Stop a container
    Stop {
        /// Container id or name
        id: String,
    },

    /// Stop, remove, and clean up the image of a container
    Delete {
        /// Container id or name
        id: String,
    },

    /// List all project containers
    List,

    /// Show the file tree inside a container
    Tree {
        /// Container id or name
        container: String,

        /// Directory to list (defaults to the workspace)
        path: Option<String>,

        /// Include file contents
        #[arg(long)]
        content: bool,
    },

    /// Print a file from a container
    Read {
        container: String,
        path: String,
    },

    /// Write a file into a container (content from --content or stdin)
    Write {
        container: String,
        path: String,

        /// Content to write; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
    },

    /// Move a file inside a container
    Rename {
        container: String,
        from: String,
        to: String,
    },

    /// Remove a file or directory inside a container
    Rm {
        container: String,
        path: String,
    },
}
