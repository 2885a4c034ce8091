//! Remote filesystem access inside a container
//!
//! There is no direct filesystem access: listing and reading go through
//! `exec`, writing goes through a local temporary file copied in with `cp`.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use futures::future::join_all;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::tree::{build_forest, normalize_root, FileNode, NodeKind, TreeEntry};
use crate::diagnostics::{record, Diagnostic, DiagnosticKind, Outcome};
use crate::error::{Result, SandboxError};
use crate::executor::shell_quote;
use crate::runtime::RuntimeClient;

/// Directories never descended into.
const PRUNED_DIRS: &[&str] = &["node_modules", ".next"];

/// UI component library skipped when contents are included.
const PRUNED_CONTENT_PATH: &str = "*/components/ui";

/// Generated or boilerplate files skipped when contents are included.
const BOILERPLATE_FILES: &[&str] = &[
    "package-lock.json",
    "next-env.d.ts",
    ".eslintrc.json",
    "postcss.config.mjs",
    "tailwind.config.ts",
    "components.json",
];

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Lines read back after a write, for the debug log only.
const VERIFY_LINES: usize = 5;

/// Mode of a staged file. `cp` keeps it, so it must be readable by the
/// unprivileged user the app runs as.
const STAGED_MODE: u32 = 0o644;

pub struct RemoteFileSystem {
    runtime: RuntimeClient,
}

impl RemoteFileSystem {
    pub fn new(runtime: RuntimeClient) -> Self {
        Self { runtime }
    }

    /// Resolve a path against the workspace directory unless it is absolute.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        let base = normalize_root(&self.runtime.settings().workspace_dir);
        let relative = path.trim_start_matches("./");
        if relative.is_empty() || relative == "." {
            return if base.is_empty() { "/".to_string() } else { base.to_string() };
        }
        format!("{}/{}", base, relative)
    }

    /// `find` invocation listing everything under `root` except the root
    /// itself and the pruned names.
    pub fn list_command(root: &str, include_content: bool) -> String {
        let mut prune: Vec<String> = PRUNED_DIRS
            .iter()
            .map(|name| format!("-name {}", shell_quote(name)))
            .collect();
        if include_content {
            prune.push(format!("-path {}", shell_quote(PRUNED_CONTENT_PATH)));
            prune.extend(
                BOILERPLATE_FILES
                    .iter()
                    .map(|name| format!("-name {}", shell_quote(name))),
            );
        }
        format!(
            "find {} -mindepth 1 \\( {} \\) -prune -o -print",
            shell_quote(root),
            prune.join(" -o ")
        )
    }

    /// Directory structure under `root` (workspace directory by default).
    /// Listing is advisory: a failed `find` yields an empty forest plus a
    /// diagnostic.
    pub async fn file_tree(&self, container: &str, root: Option<&str>) -> Outcome<Vec<FileNode>> {
        let root = self.resolve(root.unwrap_or("."));
        let mut diagnostics = Vec::new();
        let entries = self
            .classified_entries(container, &root, false, &mut diagnostics)
            .await;
        Outcome::with_diagnostics(build_forest(&root, entries), diagnostics)
    }

    /// Directory structure with file contents embedded. A file that can't be
    /// read gets a placeholder content and a diagnostic; the rest is intact.
    pub async fn file_content_tree(&self, container: &str, root: Option<&str>) -> Outcome<Vec<FileNode>> {
        let root = self.resolve(root.unwrap_or("."));
        let mut diagnostics = Vec::new();
        let mut entries = self
            .classified_entries(container, &root, true, &mut diagnostics)
            .await;

        let files: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == NodeKind::File)
            .map(|(i, _)| i)
            .collect();

        let batch_size = self.runtime.settings().read_batch_size.max(1);

        for batch in files.chunks(batch_size) {
            let reads = batch
                .iter()
                .map(|&i| self.read_file(container, &entries[i].path));
            let results = join_all(reads).await;

            for (&i, result) in batch.iter().zip(results) {
                let content = match result {
                    Ok(content) => content,
                    Err(e) => {
                        diagnostics.push(record(
                            DiagnosticKind::FileRead,
                            format!("{}: {}", entries[i].path, e),
                        ));
                        format!("// Error reading file: {}", e)
                    }
                };
                entries[i].content = Some(content);
            }
        }

        Outcome::with_diagnostics(build_forest(&root, entries), diagnostics)
    }

    async fn classified_entries(
        &self,
        container: &str,
        root: &str,
        include_content: bool,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<TreeEntry> {
        let listing = match self
            .runtime
            .exec(container, &Self::list_command(root, include_content))
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                diagnostics.push(record(
                    DiagnosticKind::Listing,
                    format!("failed to list files under {}: {}", root, e),
                ));
                return Vec::new();
            }
        };

        let mut paths: Vec<&str> = listing
            .stdout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && *line != root)
            .collect();
        paths.sort_unstable();
        paths.dedup();

        // One round trip per path.
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let stat = self
                .runtime
                .exec(container, &format!("stat -c %F {}", shell_quote(path)))
                .await;
            match stat {
                Ok(output) => entries.push(TreeEntry::new(path, NodeKind::from_stat(&output.stdout))),
                Err(e) => diagnostics.push(record(
                    DiagnosticKind::Listing,
                    format!("skipped {}, could not classify it: {}", path, e),
                )),
            }
        }
        entries
    }

    /// Read up to the configured byte ceiling, without a leading BOM.
    pub async fn read_file(&self, container: &str, path: &str) -> Result<String> {
        let path = self.resolve(path);
        let command = format!(
            "head -c {} {}",
            self.runtime.settings().max_file_bytes,
            shell_quote(&path)
        );
        let output = self.runtime.exec(container, &command).await?;
        Ok(strip_bom(output.stdout))
    }

    /// Write `content` to `path` inside the container.
    ///
    /// The content is staged in a local temporary file which is removed
    /// whatever the outcome. A failed copy is retried once after creating
    /// the destination directory.
    pub async fn write_file(&self, container: &str, path: &str, content: &str) -> Result<Outcome<()>> {
        let target = self.resolve(path);

        let staged = stage(content)
            .await
            .map_err(|e| SandboxError::during("write file", e))?;

        let result = self.copy_with_fallback(container, staged.path(), &target).await;

        let mut outcome = Outcome::new(());
        if result.is_ok() {
            self.verify_write(container, &target, &mut outcome).await;
        }

        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            outcome.note(
                DiagnosticKind::TempCleanup,
                format!("failed to remove {}: {}", staged_path.display(), e),
            );
        }

        result.map_err(|e| SandboxError::during("write file", e))?;
        info!(container = %container, path = %target, bytes = content.len(), "file written");
        Ok(outcome)
    }

    async fn copy_with_fallback(&self, container: &str, local: &Path, target: &str) -> Result<()> {
        match self.runtime.copy_in(local, container, target).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(path = %target, error = %e, "copy failed, creating parent directory");
                let parent = parent_dir(target);
                self.runtime
                    .exec(container, &format!("mkdir -p {}", shell_quote(parent)))
                    .await?;
                self.runtime.copy_in(local, container, target).await
            }
        }
    }

    async fn verify_write(&self, container: &str, target: &str, outcome: &mut Outcome<()>) {
        let command = format!("head -n {} {}", VERIFY_LINES, shell_quote(target));
        match self.runtime.exec(container, &command).await {
            Ok(output) => debug!(path = %target, head = %output.stdout, "write verified"),
            Err(e) => outcome.note(
                DiagnosticKind::WriteVerification,
                format!("could not read back {}: {}", target, e),
            ),
        }
    }

    /// Move a file, creating the destination directory first.
    pub async fn rename_file(&self, container: &str, from: &str, to: &str) -> Result<()> {
        let from = self.resolve(from);
        let to = self.resolve(to);
        let script = format!(
            "mkdir -p {} && mv {} {}",
            shell_quote(parent_dir(&to)),
            shell_quote(&from),
            shell_quote(&to)
        );
        self.runtime
            .exec(container, &script)
            .await
            .map_err(|e| SandboxError::during("rename file", e))?;
        info!(container = %container, from = %from, to = %to, "file renamed");
        Ok(())
    }

    /// Remove a file or directory recursively.
    pub async fn remove_file(&self, container: &str, path: &str) -> Result<()> {
        let path = self.resolve(path);
        self.runtime
            .exec(container, &format!("rm -rf {}", shell_quote(&path)))
            .await
            .map_err(|e| SandboxError::during("remove file", e))?;
        info!(container = %container, path = %path, "file removed");
        Ok(())
    }
}

/// Write `content` to a fresh local temporary file off the async runtime.
/// The file is removed again if staging fails part way.
async fn stage(content: &str) -> Result<NamedTempFile> {
    let bytes = content.as_bytes().to_vec();
    let staged = tokio::task::spawn_blocking(move || -> io::Result<NamedTempFile> {
        let mut staged = tempfile::Builder::new()
            .prefix("sessionbox-write-")
            .tempfile()?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        make_readable(staged.as_file())?;
        Ok(staged)
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
    Ok(staged)
}

#[cfg(unix)]
fn make_readable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(STAGED_MODE))
}

#[cfg(not(unix))]
fn make_readable(_file: &File) -> io::Result<()> {
    Ok(())
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

fn strip_bom(content: String) -> String {
    match content.strip_prefix(BYTE_ORDER_MARK) {
        Some(rest) => rest.to_string(),
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::executor::fake::ScriptedExecutor;
    use crate::executor::{CommandOutput, ExecOptions, ProcessExecutor};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn bridge(executor: ScriptedExecutor) -> (RemoteFileSystem, Arc<ScriptedExecutor>) {
        let executor = Arc::new(executor);
        let runtime = RuntimeClient::new(executor.clone(), Arc::new(Settings::default()));
        (RemoteFileSystem::new(runtime), executor)
    }

    fn staged_file_of(command: &str) -> PathBuf {
        command.split(' ').nth(2).unwrap().into()
    }

    #[test]
    fn test_resolve() {
        let (fs, _) = bridge(ScriptedExecutor::new());
        assert_eq!(fs.resolve("/etc/hosts"), "/etc/hosts");
        assert_eq!(fs.resolve("src/page.tsx"), "/app/src/page.tsx");
        assert_eq!(fs.resolve("./src"), "/app/src");
        assert_eq!(fs.resolve("."), "/app");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/app/src/a.ts"), "/app/src");
        assert_eq!(parent_dir("/a.ts"), "/");
    }

    #[test]
    fn test_list_command_prunes() {
        let plain = RemoteFileSystem::list_command("/app", false);
        assert_eq!(
            plain,
            "find /app -mindepth 1 \\( -name node_modules -o -name .next \\) -prune -o -print"
        );
        let content = RemoteFileSystem::list_command("/app", true);
        assert!(content.contains("-path '*/components/ui'"));
        assert!(content.contains("-name package-lock.json"));
    }

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{feff}hello".to_string()), "hello");
        assert_eq!(strip_bom("hello".to_string()), "hello");
    }

    fn tree_executor() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .ok("find ", "/root/c\n/root/a/b.txt\n/root/a\n")
            .ok("%F /root/a'", "directory\n")
            .ok("%F /root/c'", "directory\n")
            .ok("%F /root/a/b.txt'", "regular file\n")
    }

    #[tokio::test]
    async fn test_file_tree() {
        let (fs, executor) = bridge(tree_executor());
        let outcome = fs.file_tree("c1", Some("/root")).await;
        assert!(outcome.is_clean());
        let forest = outcome.value;

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].name, "a");
        assert_eq!(forest[1].name, "c");
        let children = forest[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "b.txt");
        assert!(children[0].content.is_none());

        assert_eq!(executor.calls_matching("stat -c %F").len(), 3);
        assert!(executor.calls_matching("head -c").is_empty());
    }

    #[tokio::test]
    async fn test_file_tree_listing_failure_degrades_to_empty() {
        let (fs, executor) = bridge(ScriptedExecutor::new().fail("find ", "No such file or directory"));

        let outcome = fs.file_tree("c1", Some("/missing")).await;
        assert!(outcome.value.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::Listing);
        assert!(executor.calls_matching("stat -c").is_empty());

        let outcome = fs.file_content_tree("c1", Some("/missing")).await;
        assert!(outcome.value.is_empty());
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::Listing);
    }

    #[tokio::test]
    async fn test_unclassifiable_path_is_reported() {
        let executor = ScriptedExecutor::new()
            .ok("find ", "/root/a\n/root/a/b.txt\n/root/c.txt\n")
            .fail("%F /root/a'", "No such file or directory")
            .ok("%F /root/", "regular file\n");
        let (fs, _) = bridge(executor);

        let outcome = fs.file_tree("c1", Some("/root")).await;
        let names: Vec<&str> = outcome.value.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["c.txt"]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::Listing);
        assert!(outcome.diagnostics[0].message.contains("/root/a"));
    }

    #[tokio::test]
    async fn test_file_content_tree_survives_read_failure() {
        let executor = ScriptedExecutor::new()
            .ok("find ", "/root/a\n/root/a/b.txt\n/root/a/d.txt\n/root/c.txt\n")
            .ok("%F /root/a'", "directory\n")
            .ok("%F /root/", "regular file\n")
            .fail("head -c 10000000 /root/a/d.txt'", "Permission denied")
            .ok("head -c 10000000 /root/a/b.txt'", "\u{feff}bee")
            .ok("head -c 10000000 /root/c.txt'", "sea");
        let (fs, _) = bridge(executor);

        let outcome = fs.file_content_tree("c1", Some("/root")).await;
        let forest = &outcome.value;
        assert_eq!(forest.len(), 2);

        let a = &forest[0];
        assert!(a.content.is_none());
        let b = a.find("/root/a/b.txt").unwrap();
        assert_eq!(b.content.as_deref(), Some("bee"));
        let d = a.find("/root/a/d.txt").unwrap();
        assert!(d.content.as_deref().unwrap().starts_with("// Error reading file:"));
        assert_eq!(forest[1].content.as_deref(), Some("sea"));

        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::FileRead);
    }

    /// Tracks how many file reads are outstanding at once.
    struct ReadTracker {
        inner: ScriptedExecutor,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        events: Mutex<Vec<String>>,
    }

    impl ReadTracker {
        fn position(&self, event: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .position(|e| e == event)
                .unwrap()
        }
    }

    #[async_trait]
    impl ProcessExecutor for ReadTracker {
        async fn run(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
            let Some(path) = command.split("head -c 10000000 ").nth(1) else {
                return self.inner.run(command, opts).await;
            };
            let path = path.trim_end_matches('\'');
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("start {}", path));
            tokio::task::yield_now().await;
            self.events.lock().unwrap().push(format!("end {}", path));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CommandOutput {
                stdout: path.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_content_reads_run_in_bounded_batches() {
        let files = ["/root/f1", "/root/f2", "/root/f3", "/root/f4", "/root/f5"];
        let tracker = Arc::new(ReadTracker {
            inner: ScriptedExecutor::new()
                .ok("find ", &files.join("\n"))
                .ok("stat -c %F", "regular file\n"),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        });
        let settings = Settings {
            read_batch_size: 2,
            ..Settings::default()
        };
        let fs = RemoteFileSystem::new(RuntimeClient::new(tracker.clone(), Arc::new(settings)));

        let outcome = fs.file_content_tree("c1", Some("/root")).await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.value.len(), 5);
        assert_eq!(outcome.value[4].content.as_deref(), Some("/root/f5"));

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);
        for (batch, next) in [(["/root/f1", "/root/f2"], "/root/f3"), (["/root/f3", "/root/f4"], "/root/f5")] {
            let next_start = tracker.position(&format!("start {}", next));
            for path in batch {
                assert!(tracker.position(&format!("end {}", path)) < next_start);
            }
        }
    }

    #[tokio::test]
    async fn test_read_file_strips_bom() {
        let (fs, executor) = bridge(ScriptedExecutor::new().ok("head -c", "\u{feff}{\"a\":1}"));
        let content = fs.read_file("c1", "package.json").await.unwrap();
        assert_eq!(content, "{\"a\":1}");
        assert_eq!(executor.calls_matching("head -c 10000000 /app/package.json").len(), 1);
    }

    #[tokio::test]
    async fn test_write_file_removes_staged_file() {
        let (fs, executor) = bridge(ScriptedExecutor::new().ok("head -n", "line1\n"));
        let outcome = fs.write_file("c1", "src/a.ts", "export const a = 1;\n").await.unwrap();
        assert!(outcome.is_clean());

        let copies = executor.calls_matching("docker cp ");
        assert_eq!(copies.len(), 1);
        assert!(copies[0].ends_with("c1:/app/src/a.ts"));
        assert!(!staged_file_of(&copies[0]).exists());
        assert!(executor.calls_matching("mkdir -p").is_empty());
    }

    /// Records the mode of the staged file at the moment it is copied in.
    #[cfg(unix)]
    struct StagedModeRecorder {
        modes: Mutex<Vec<u32>>,
    }

    #[cfg(unix)]
    #[async_trait]
    impl ProcessExecutor for StagedModeRecorder {
        async fn run(&self, command: &str, _opts: &ExecOptions) -> Result<CommandOutput> {
            use std::os::unix::fs::PermissionsExt;
            if command.contains(" cp ") {
                let mode = std::fs::metadata(staged_file_of(command))?.permissions().mode();
                self.modes.lock().unwrap().push(mode & 0o777);
            }
            Ok(CommandOutput::default())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_staged_file_is_world_readable() {
        let recorder = Arc::new(StagedModeRecorder {
            modes: Mutex::new(Vec::new()),
        });
        let runtime = RuntimeClient::new(recorder.clone(), Arc::new(Settings::default()));
        let fs = RemoteFileSystem::new(runtime);

        fs.write_file("c1", "/app/page.tsx", "export default 1;\n").await.unwrap();
        assert_eq!(*recorder.modes.lock().unwrap(), vec![0o644]);
    }

    #[tokio::test]
    async fn test_write_file_creates_directory_and_retries() {
        let executor = ScriptedExecutor::new().fail_once("docker cp ", "Could not find the file /app/new");
        let (fs, executor) = bridge(executor);

        fs.write_file("c1", "/app/new/dir/a.ts", "x").await.unwrap();

        let calls = executor.calls();
        let mkdir = executor.position("mkdir -p /app/new/dir").unwrap();
        let copies: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains("docker cp "))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(copies.len(), 2);
        assert!(copies[0] < mkdir && mkdir < copies[1]);
    }

    #[tokio::test]
    async fn test_write_file_failure_still_removes_staged_file() {
        let (fs, executor) = bridge(ScriptedExecutor::new().fail("docker cp ", "no such container"));

        let err = fs.write_file("c1", "/app/a.ts", "x").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to write file"));

        let copies = executor.calls_matching("docker cp ");
        assert_eq!(copies.len(), 2);
        assert!(!staged_file_of(&copies[0]).exists());
        assert!(executor.calls_matching("head -n").is_empty());
    }

    #[tokio::test]
    async fn test_write_verification_failure_is_advisory() {
        let (fs, _) = bridge(ScriptedExecutor::new().fail("head -n", "Permission denied"));
        let outcome = fs.write_file("c1", "/app/a.ts", "x").await.unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::WriteVerification);
    }

    #[tokio::test]
    async fn test_rename_and_remove() {
        let (fs, executor) = bridge(ScriptedExecutor::new());
        fs.rename_file("c1", "a.ts", "lib/b.ts").await.unwrap();
        fs.remove_file("c1", "old").await.unwrap();

        assert_eq!(
            executor.calls_matching("mv ")[0],
            "docker exec c1 sh -c 'mkdir -p /app/lib && mv /app/a.ts /app/lib/b.ts'"
        );
        assert_eq!(
            executor.calls_matching("rm -rf")[0],
            "docker exec c1 sh -c 'rm -rf /app/old'"
        );
    }
}
