//! Sessionbox - per-session application sandboxes
//!
//! Sessionbox sequences calls to an external container runtime: it builds a
//! session image, allocates a free host port, drives the container through
//! its lifecycle and edits files inside it.
//!
//! # Example
//!
//! ```no_run
//! use sessionbox::{Sessionbox, Settings};
//!
//! # async fn demo() -> sessionbox::Result<()> {
//! let ctx = Sessionbox::new(Settings::default());
//! let image = ctx.containers().build_image("session-1").await?.value;
//! let created = ctx.containers().create_container(&image, "session-1").await?;
//! println!("listening on {}", created.port);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod container;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod fs;
pub mod output;
pub mod ports;
pub mod runtime;

pub use config::Settings;
pub use container::{ContainerManager, CreatedContainer, DeletedContainer, StartedContainer};
pub use context::Sessionbox;
pub use diagnostics::{Diagnostic, DiagnosticKind, Outcome};
pub use error::{Result, SandboxError};
pub use executor::{CommandOutput, ExecOptions, ProcessExecutor, ShellExecutor};
pub use fs::{FileNode, NodeKind, RemoteFileSystem};
pub use output::{format_output, OutputFormat};
pub use ports::PortAllocator;
pub use runtime::{ContainerState, ContainerSummary, RuntimeClient};
