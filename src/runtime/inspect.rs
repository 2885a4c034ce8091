//! Normalization of `inspect` output
//!
//! The runtime answers with either a single object or an array of them,
//! and with `null` in most optional places. Everything is collapsed into
//! [`ContainerState`] right here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::LABEL_ASSIGNED_PORT;
use crate::error::{Result, SandboxError};

/// What the lifecycle manager needs to know about a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub status: String,
    /// Host port bound to the container port, if the runtime reports one
    pub port_binding: Option<u16>,
    pub labels: HashMap<String, String>,
}

impl ContainerState {
    /// Port recorded in the `assignedPort` label.
    pub fn labeled_port(&self) -> Option<u16> {
        self.labels
            .get(LABEL_ASSIGNED_PORT)
            .and_then(|p| p.trim().parse().ok())
    }

    /// Live binding first, label as fallback.
    pub fn bound_port(&self) -> Option<u16> {
        self.port_binding.or_else(|| self.labeled_port())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InspectResponse {
    Many(Vec<RawInspect>),
    One(Box<RawInspect>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInspect {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    config: Option<RawConfig>,
    #[serde(default)]
    state: Option<RawState>,
    #[serde(default)]
    network_settings: Option<RawNetworkSettings>,
    #[serde(default)]
    host_config: Option<RawHostConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNetworkSettings {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<RawBinding>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHostConfig {
    #[serde(default)]
    port_bindings: Option<HashMap<String, Option<Vec<RawBinding>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBinding {
    #[serde(default)]
    host_port: Option<String>,
}

type BindingMap = HashMap<String, Option<Vec<RawBinding>>>;

fn first_host_port(map: Option<&BindingMap>, key: &str) -> Option<u16> {
    map?.get(key)?
        .as_ref()?
        .iter()
        .filter_map(|b| b.host_port.as_deref())
        .find_map(|p| p.trim().parse().ok())
}

/// Parse raw `inspect` JSON into a [`ContainerState`].
///
/// `port_key` is the runtime's key for the container port, e.g. `3000/tcp`.
pub fn parse_inspect(raw: &str, port_key: &str) -> Result<ContainerState> {
    let response: InspectResponse = serde_json::from_str(raw.trim())?;
    let inspect = match response {
        InspectResponse::Many(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| SandboxError::InvalidResponse("empty inspect result".to_string()))?,
        InspectResponse::One(item) => *item,
    };

    let config = inspect.config.unwrap_or_default();
    let state = inspect.state.unwrap_or_default();

    let live = inspect.network_settings.and_then(|n| n.ports);
    let configured = inspect.host_config.and_then(|h| h.port_bindings);
    let port_binding = first_host_port(live.as_ref(), port_key)
        .or_else(|| first_host_port(configured.as_ref(), port_key));

    Ok(ContainerState {
        id: inspect.id,
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        running: state.running,
        status: state.status.unwrap_or_else(|| {
            if state.running { "running" } else { "exited" }.to_string()
        }),
        port_binding,
        labels: config.labels.unwrap_or_default(),
    })
}
