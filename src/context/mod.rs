//! Process-wide service context
//!
//! One [`Sessionbox`] is constructed per process. It owns the port
//! allocator (through the container manager) and hands the same runtime
//! client to the filesystem bridge, so there is no ambient global state.

use std::sync::Arc;

use crate::config::Settings;
use crate::container::ContainerManager;
use crate::executor::{ProcessExecutor, ShellExecutor};
use crate::fs::RemoteFileSystem;

pub struct Sessionbox {
    settings: Arc<Settings>,
    containers: ContainerManager,
    files: RemoteFileSystem,
}

impl Sessionbox {
    /// Context backed by host shell commands.
    pub fn new(settings: Settings) -> Self {
        Self::with_executor(Arc::new(ShellExecutor::new()), settings)
    }

    pub fn with_executor(executor: Arc<dyn ProcessExecutor>, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let containers = ContainerManager::with_executor(executor, settings.clone());
        let files = RemoteFileSystem::new(containers.runtime().clone());
        Self {
            settings,
            containers,
            files,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn containers(&self) -> &ContainerManager {
        &self.containers
    }

    pub fn files(&self) -> &RemoteFileSystem {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::ScriptedExecutor;

    #[tokio::test]
    async fn test_shared_allocator_across_operations() {
        let executor = Arc::new(ScriptedExecutor::new().ok(" create ", "c1\n"));
        let ctx = Sessionbox::with_executor(executor.clone(), Settings::default());

        let first = ctx.containers().create_container("img", "a").await.unwrap();
        let second = ctx.containers().create_container("img", "b").await.unwrap();
        assert_ne!(first.port, second.port);

        ctx.files().remove_file("c1", "tmp").await.unwrap();
        assert_eq!(executor.calls_matching("rm -rf /app/tmp").len(), 1);
    }
}
