//! Runtime settings shared by the lifecycle manager, port allocator and
//! remote filesystem bridge.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Label key carrying the project marker.
pub const LABEL_PROJECT: &str = "project";
/// Label key carrying the container type marker.
pub const LABEL_TYPE: &str = "type";
/// Label key recording the host port assigned at creation time.
pub const LABEL_ASSIGNED_PORT: &str = "assignedPort";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Container runtime binary invoked for every operation
    pub runtime: String,
    /// Prefix for image tags and container names
    pub name_prefix: String,
    /// Value of the `project` label on every managed container
    pub project_label: String,
    /// Value of the `type` label on every managed container
    pub type_label: String,
    /// First host port considered by the allocator
    pub base_port: u16,
    /// Port the application listens on inside the container
    pub container_port: u16,
    /// Number of candidates scanned before giving up
    pub port_window: u16,
    /// Output ceiling for a single external command, in bytes
    pub max_output_bytes: usize,
    /// Image definition copied into every build context
    pub dockerfile: String,
    /// Directory inside the container that relative paths resolve against
    pub workspace_dir: String,
    /// Concurrent reads per batch during content-inclusive traversal
    pub read_batch_size: usize,
    /// Maximum number of bytes returned by a single file read
    pub max_file_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            name_prefix: "sessionbox".to_string(),
            project_label: "sessionbox".to_string(),
            type_label: "app-sandbox".to_string(),
            base_port: 3001,
            container_port: 3000,
            port_window: 1000,
            max_output_bytes: 50 * 1024 * 1024,
            dockerfile: "Dockerfile".to_string(),
            workspace_dir: "/app".to_string(),
            read_batch_size: 10,
            max_file_bytes: 10_000_000,
        }
    }
}

impl Settings {
    /// Image tag for a session.
    pub fn image_name(&self, session_id: &str) -> Result<String> {
        Ok(format!("{}-{}", self.name_prefix, sanitize_session_id(session_id)?))
    }

    /// Container name for a session.
    pub fn container_name(&self, session_id: &str) -> Result<String> {
        Ok(format!("{}-{}", self.name_prefix, sanitize_session_id(session_id)?))
    }

    /// Whether an image reference follows this system's naming convention.
    pub fn owns_image(&self, image: &str) -> bool {
        image.starts_with(&format!("{}-", self.name_prefix))
    }

    /// Key under which the runtime reports the container port binding.
    pub fn container_port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// Lower-case a session id into a valid tag component. Anything a runtime
/// would reject becomes a separator; runs of separators collapse to their
/// first character and leading or trailing ones are dropped.
pub fn sanitize_session_id(session_id: &str) -> Result<String> {
    let mut sanitized = String::with_capacity(session_id.len());
    let mut pending: Option<char> = None;
    for c in session_id.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if let Some(sep) = pending.take() {
                if !sanitized.is_empty() {
                    sanitized.push(sep);
                }
            }
            sanitized.push(c);
        } else if pending.is_none() {
            pending = Some(if c == '_' || c == '.' { c } else { '-' });
        }
    }
    if sanitized.is_empty() {
        return Err(SandboxError::InvalidSessionId(session_id.to_string()));
    }
    Ok(sanitized)
}
