//! Container lifecycle manager
//!
//! The ContainerManager sequences build, create, start, stop and delete
//! against the runtime. Running state and ports are always read back from
//! the runtime; the allocator's reservations are only a hint.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{info, warn};

use super::types::{CreatedContainer, DeletedContainer, StartedContainer};
use crate::config::Settings;
use crate::diagnostics::{record, DiagnosticKind, Outcome};
use crate::error::{Result, SandboxError};
use crate::executor::ProcessExecutor;
use crate::ports::PortAllocator;
use crate::runtime::{ContainerState, ContainerSummary, RuntimeClient};

/// Name of the definition file inside a build context.
const BUILD_DEFINITION: &str = "Dockerfile";

pub struct ContainerManager {
    runtime: RuntimeClient,
    ports: Arc<PortAllocator>,
}

impl ContainerManager {
    pub fn new(runtime: RuntimeClient, ports: Arc<PortAllocator>) -> Self {
        Self { runtime, ports }
    }

    /// Wire up a runtime client and a fresh allocator over one executor.
    pub fn with_executor(executor: Arc<dyn ProcessExecutor>, settings: Arc<Settings>) -> Self {
        let runtime = RuntimeClient::new(executor, settings);
        let ports = Arc::new(PortAllocator::new(runtime.clone()));
        Self::new(runtime, ports)
    }

    pub fn runtime(&self) -> &RuntimeClient {
        &self.runtime
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    fn settings(&self) -> &Settings {
        self.runtime.settings()
    }

    /// Build the session image from the configured definition file and
    /// return its tag. The temporary build context is removed either way.
    pub async fn build_image(&self, session_id: &str) -> Result<Outcome<String>> {
        let tag = self
            .settings()
            .image_name(session_id)
            .map_err(|e| SandboxError::during("build image", e))?;
        let definition = Path::new(&self.settings().dockerfile).to_path_buf();

        let context = tempfile::Builder::new()
            .prefix("sessionbox-build-")
            .tempdir()
            .map_err(|e| SandboxError::during("build image", e.into()))?;

        info!(image = %tag, "building image");
        let result = self.build_in(&context, &definition, &tag).await;

        let mut outcome = Outcome::new(tag);
        let context_path = context.path().to_path_buf();
        if let Err(e) = context.close() {
            outcome.note(
                DiagnosticKind::TempCleanup,
                format!("failed to remove build context {}: {}", context_path.display(), e),
            );
        }

        result.map_err(|e| SandboxError::during("build image", e))?;
        Ok(outcome)
    }

    async fn build_in(&self, context: &TempDir, definition: &Path, tag: &str) -> Result<()> {
        tokio::fs::copy(definition, context.path().join(BUILD_DEFINITION)).await?;
        self.runtime.build(tag, context.path()).await?;
        Ok(())
    }

    /// Allocate a port, create the container with its labels, and start it.
    pub async fn create_container(&self, image: &str, session_id: &str) -> Result<CreatedContainer> {
        let name = self
            .settings()
            .container_name(session_id)
            .map_err(|e| SandboxError::during("create container", e))?;
        let port = self
            .ports
            .allocate(self.settings().base_port)
            .await
            .map_err(|e| SandboxError::during("create container", e))?;

        let id = match self.runtime.create(&name, image, port).await {
            Ok(id) => id,
            Err(e) => {
                self.ports.release(port);
                return Err(SandboxError::during("create container", e));
            }
        };

        if let Err(e) = self.runtime.start(&id).await {
            self.ports.release(port);
            return Err(SandboxError::during("start container", e));
        }

        info!(container = %name, id = %id, port, "container created");
        Ok(CreatedContainer { id, name, port })
    }

    /// Start a created container, or report the port of a running one.
    pub async fn start_container(&self, id: &str) -> Result<StartedContainer> {
        self.start_inner(id)
            .await
            .map_err(|e| SandboxError::during("start container", e))
    }

    async fn start_inner(&self, id: &str) -> Result<StartedContainer> {
        let state = self.runtime.inspect(id).await?;

        if state.running {
            let port = state
                .bound_port()
                .ok_or_else(|| SandboxError::PortUndeterminable(id.to_string()))?;
            return Ok(StartedContainer { port, started: false });
        }

        let recorded = state
            .labeled_port()
            .or(state.port_binding)
            .ok_or_else(|| SandboxError::PortUndeterminable(id.to_string()))?;

        // A stopped container still owns the port its label records, even if
        // this process reserved it at create time and never saw a stop.
        let port = if self.ports.reclaim_owned(recorded).await {
            recorded
        } else {
            let allocated = self.ports.allocate(self.settings().base_port).await?;
            if allocated != recorded {
                // The container's mapping can't change; the caller has to recreate it.
                self.ports.release(allocated);
                return Err(SandboxError::PortConflict { recorded, allocated });
            }
            allocated
        };

        if let Err(e) = self.runtime.start(id).await {
            self.ports.release(port);
            return Err(e);
        }

        info!(id = %id, port, "container started");
        Ok(StartedContainer { port, started: true })
    }

    /// Stop a container and drop its port reservation.
    pub async fn stop_container(&self, id: &str) -> Result<()> {
        self.stop_inner(id)
            .await
            .map_err(|e| SandboxError::during("stop container", e))
    }

    async fn stop_inner(&self, id: &str) -> Result<()> {
        let state = self.runtime.inspect(id).await?;
        match state.bound_port() {
            Some(port) => {
                self.ports.release(port);
            }
            None => warn!(id = %id, "no port recorded for container being stopped"),
        }
        self.runtime.stop(id).await?;
        info!(id = %id, "container stopped");
        Ok(())
    }

    /// Stop if needed, remove the container, then try to remove its image.
    pub async fn delete_container(&self, id: &str) -> Result<Outcome<DeletedContainer>> {
        self.delete_inner(id)
            .await
            .map_err(|e| SandboxError::during("delete container", e))
    }

    async fn delete_inner(&self, id: &str) -> Result<Outcome<DeletedContainer>> {
        let state = self.runtime.inspect(id).await?;

        let released_port = state.bound_port();
        if let Some(port) = released_port {
            self.ports.release(port);
        }

        if state.running {
            self.runtime.stop(id).await?;
        }
        self.runtime.remove(id, true).await?;
        info!(id = %id, "container removed");

        let mut outcome = Outcome::new(DeletedContainer {
            released_port,
            was_running: state.running,
            image_removed: None,
        });
        self.remove_image(&state, &mut outcome).await;
        Ok(outcome)
    }

    async fn remove_image(&self, state: &ContainerState, outcome: &mut Outcome<DeletedContainer>) {
        if state.image.is_empty() || !self.settings().owns_image(&state.image) {
            return;
        }
        match self.runtime.remove_image(&state.image).await {
            Ok(()) => outcome.value.image_removed = Some(state.image.clone()),
            Err(e) => outcome.note(
                DiagnosticKind::ImageCleanup,
                format!("failed to remove image {}: {}", state.image, e),
            ),
        }
    }

    /// Every container labeled for this project. Listing is advisory, so a
    /// runtime failure yields an empty list plus a diagnostic.
    pub async fn list_containers(&self) -> Outcome<Vec<ContainerSummary>> {
        match self.runtime.list().await {
            Ok(containers) => Outcome::new(containers),
            Err(e) => Outcome::with_diagnostics(
                Vec::new(),
                vec![record(
                    DiagnosticKind::Listing,
                    format!("failed to list containers: {}", e),
                )],
            ),
        }
    }

    pub async fn inspect(&self, id: &str) -> Result<ContainerState> {
        self.runtime
            .inspect(id)
            .await
            .map_err(|e| SandboxError::during("inspect container", e))
    }
}
