//! Container runtime command builders
//!
//! Each operation is one deterministic command string handed to the
//! executor. The client keeps no state of its own.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Settings, LABEL_ASSIGNED_PORT, LABEL_PROJECT, LABEL_TYPE};
use crate::error::Result;
use crate::executor::{shell_quote, CommandOutput, ExecOptions, ProcessExecutor};
use crate::runtime::inspect::{parse_inspect, ContainerState};
use crate::runtime::listing::{parse_listing, ContainerSummary};

#[derive(Clone)]
pub struct RuntimeClient {
    executor: Arc<dyn ProcessExecutor>,
    settings: Arc<Settings>,
}

impl RuntimeClient {
    pub fn new(executor: Arc<dyn ProcessExecutor>, settings: Arc<Settings>) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &Arc<dyn ProcessExecutor> {
        &self.executor
    }

    fn bin(&self) -> String {
        shell_quote(&self.settings.runtime)
    }

    fn large(&self) -> ExecOptions {
        ExecOptions::with_limit(self.settings.max_output_bytes)
    }

    async fn run(&self, command: String) -> Result<CommandOutput> {
        self.executor.run(&command, &ExecOptions::default()).await
    }

    pub fn build_command(&self, tag: &str, context_dir: &Path) -> String {
        format!(
            "{} build -t {} {}",
            self.bin(),
            shell_quote(tag),
            shell_quote(&context_dir.to_string_lossy())
        )
    }

    pub fn create_command(&self, name: &str, image: &str, host_port: u16) -> String {
        let labels = [
            (LABEL_PROJECT, self.settings.project_label.clone()),
            (LABEL_TYPE, self.settings.type_label.clone()),
            (LABEL_ASSIGNED_PORT, host_port.to_string()),
        ];
        let label_args: Vec<String> = labels
            .iter()
            .map(|(key, value)| format!("--label {}", shell_quote(&format!("{}={}", key, value))))
            .collect();

        format!(
            "{} create --name {} -p {}:{} {} {}",
            self.bin(),
            shell_quote(name),
            host_port,
            self.settings.container_port,
            label_args.join(" "),
            shell_quote(image)
        )
    }

    pub fn list_command(&self) -> String {
        format!(
            "{} ps -a --filter {} --format {}",
            self.bin(),
            shell_quote(&format!("label={}={}", LABEL_PROJECT, self.settings.project_label)),
            shell_quote("{{json .}}")
        )
    }

    pub fn assigned_ports_command(&self) -> String {
        format!(
            "{} ps -a --filter {} --format {}",
            self.bin(),
            shell_quote(&format!("label={}={}", LABEL_PROJECT, self.settings.project_label)),
            shell_quote(&format!("{{{{.Label \"{}\"}}}}", LABEL_ASSIGNED_PORT))
        )
    }

    pub fn exec_command(&self, container: &str, script: &str) -> String {
        format!(
            "{} exec {} sh -c {}",
            self.bin(),
            shell_quote(container),
            shell_quote(script)
        )
    }

    pub fn copy_in_command(&self, local: &Path, container: &str, remote: &str) -> String {
        format!(
            "{} cp {} {}",
            self.bin(),
            shell_quote(&local.to_string_lossy()),
            shell_quote(&format!("{}:{}", container, remote))
        )
    }

    /// Build an image from a context directory.
    pub async fn build(&self, tag: &str, context_dir: &Path) -> Result<CommandOutput> {
        let command = self.build_command(tag, context_dir);
        self.executor.run(&command, &self.large()).await
    }

    /// Create a container and return its runtime id.
    pub async fn create(&self, name: &str, image: &str, host_port: u16) -> Result<String> {
        let output = self.run(self.create_command(name, image, host_port)).await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn start(&self, container: &str) -> Result<()> {
        self.run(format!("{} start {}", self.bin(), shell_quote(container)))
            .await
            .map(|_| ())
    }

    pub async fn stop(&self, container: &str) -> Result<()> {
        self.run(format!("{} stop {}", self.bin(), shell_quote(container)))
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, container: &str, force: bool) -> Result<()> {
        let flag = if force { " -f" } else { "" };
        self.run(format!("{} rm{} {}", self.bin(), flag, shell_quote(container)))
            .await
            .map(|_| ())
    }

    pub async fn remove_image(&self, image: &str) -> Result<()> {
        self.run(format!("{} rmi {}", self.bin(), shell_quote(image)))
            .await
            .map(|_| ())
    }

    pub async fn inspect(&self, container: &str) -> Result<ContainerState> {
        let output = self
            .run(format!("{} inspect {}", self.bin(), shell_quote(container)))
            .await?;
        parse_inspect(&output.stdout, &self.settings.container_port_key())
    }

    /// Run a shell script inside a container.
    pub async fn exec(&self, container: &str, script: &str) -> Result<CommandOutput> {
        let command = self.exec_command(container, script);
        self.executor.run(&command, &self.large()).await
    }

    pub async fn copy_in(&self, local: &Path, container: &str, remote: &str) -> Result<()> {
        self.run(self.copy_in_command(local, container, remote))
            .await
            .map(|_| ())
    }

    /// Every container carrying this project's label.
    pub async fn list(&self) -> Result<Vec<ContainerSummary>> {
        let output = self
            .executor
            .run(&self.list_command(), &self.large())
            .await?;
        parse_listing(&output.stdout)
    }

    /// Ports recorded in the `assignedPort` label of every project container.
    pub async fn assigned_ports(&self) -> Result<HashSet<u16>> {
        let output = self.run(self.assigned_ports_command()).await?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect())
    }
}
