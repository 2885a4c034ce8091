//! Error types for Sessionbox

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("No free port found in {window} candidates starting at {start}")]
    PortExhausted { start: u16, window: u16 },

    #[error("Container port {recorded} no longer available (got {allocated}); recreate required")]
    PortConflict { recorded: u16, allocated: u16 },

    #[error("Could not determine port for container {0}")]
    PortUndeterminable(String),

    #[error("Invalid session id {0:?}: no usable characters")]
    InvalidSessionId(String),

    #[error("Command `{command}` failed ({}): {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to {operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<SandboxError>,
    },

    #[error("Command output exceeded {limit} bytes")]
    OutputLimitExceeded { limit: usize },

    #[error("Invalid runtime response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SandboxError {
    /// Wrap an error with the name of the operation that was attempted.
    pub fn during(operation: &'static str, source: SandboxError) -> Self {
        SandboxError::Operation {
            operation,
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping operation wrappers.
    pub fn root(&self) -> &SandboxError {
        match self {
            SandboxError::Operation { source, .. } => source.root(),
            other => other,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
