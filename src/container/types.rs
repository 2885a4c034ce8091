//! Result records for container lifecycle operations

use serde::{Deserialize, Serialize};

/// A freshly created and started container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedContainer {
    /// Runtime-assigned identifier
    pub id: String,
    /// Deterministic name derived from the session id
    pub name: String,
    /// Host port mapped to the application port
    pub port: u16,
}

/// Port a started container is reachable on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedContainer {
    pub port: u16,
    /// False when the container was already running and nothing was done
    pub started: bool,
}

/// What a delete actually touched
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeletedContainer {
    pub released_port: Option<u16>,
    pub was_running: bool,
    pub image_removed: Option<String>,
}
