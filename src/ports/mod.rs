//! Host port allocation
//!
//! A port is handed out only if it is not recorded in any project
//! container's `assignedPort` label, not reserved by this process, and not
//! already listened on by anything on the host. Reservations live in memory
//! only; after a restart the runtime labels are what keep old containers'
//! ports off limits.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::{Result, SandboxError};
use crate::executor::ExecOptions;
use crate::runtime::RuntimeClient;

pub struct PortAllocator {
    runtime: RuntimeClient,
    window: u16,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(runtime: RuntimeClient) -> Self {
        let window = runtime.settings().port_window;
        Self {
            runtime,
            window,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Find, reserve and return a free port at or above `start`.
    pub async fn allocate(&self, start: u16) -> Result<u16> {
        let labeled = match self.runtime.assigned_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "could not read assigned ports from runtime");
                HashSet::new()
            }
        };

        for offset in 0..self.window {
            let Some(candidate) = start.checked_add(offset) else {
                break;
            };
            if labeled.contains(&candidate) {
                continue;
            }
            // Reserve before probing so a concurrent caller skips it.
            if !self.reserve(candidate) {
                continue;
            }
            if self.has_listener(candidate).await {
                self.release(candidate);
                continue;
            }
            info!(port = candidate, "allocated port");
            return Ok(candidate);
        }

        Err(SandboxError::PortExhausted {
            start,
            window: self.window,
        })
    }

    /// Reserve a specific port if nothing else holds it.
    pub async fn try_reclaim(&self, port: u16) -> bool {
        if !self.reserve(port) {
            return false;
        }
        if self.has_listener(port).await {
            self.release(port);
            return false;
        }
        debug!(port, "reclaimed port");
        true
    }

    /// Reserve a port recorded for a stopped container. A reservation this
    /// process already holds for it counts as the container's own, so only
    /// the OS probe can refuse it.
    pub async fn reclaim_owned(&self, port: u16) -> bool {
        let newly_reserved = self.reserve(port);
        if self.has_listener(port).await {
            if newly_reserved {
                self.release(port);
            }
            return false;
        }
        debug!(port, newly_reserved, "reclaimed recorded port");
        true
    }

    /// Drop a reservation. Releasing an unreserved port does nothing.
    pub fn release(&self, port: u16) -> bool {
        let released = self.lock().remove(&port);
        if released {
            debug!(port, "released port");
        }
        released
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.lock().contains(&port)
    }

    pub fn reserved(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    fn reserve(&self, port: u16) -> bool {
        self.lock().insert(port)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<u16>> {
        self.reserved.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the OS whether something listens on `port`. A probe that cannot
    /// run counts as "nothing listening".
    async fn has_listener(&self, port: u16) -> bool {
        let command = format!("lsof -nP -iTCP:{} -sTCP:LISTEN -t", port);
        match self
            .runtime
            .executor()
            .run(&command, &ExecOptions::default())
            .await
        {
            Ok(output) => !output.stdout.trim().is_empty(),
            Err(e) => {
                debug!(port, error = %e, "port probe failed, treating as free");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::executor::fake::ScriptedExecutor;
    use std::sync::Arc;

    fn allocator(executor: ScriptedExecutor, settings: Settings) -> Arc<PortAllocator> {
        let runtime = RuntimeClient::new(Arc::new(executor), Arc::new(settings));
        Arc::new(PortAllocator::new(runtime))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_distinct() {
        let ports = allocator(ScriptedExecutor::new(), Settings::default());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ports = ports.clone();
                tokio::spawn(async move { ports.allocate(3001).await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 32);
        assert!(seen.iter().all(|p| (3001..3033).contains(p)));
    }

    #[tokio::test]
    async fn test_skips_labeled_ports() {
        let executor = ScriptedExecutor::new().ok("ps -a", "3001\n3002\n");
        let ports = allocator(executor, Settings::default());
        assert_eq!(ports.allocate(3001).await.unwrap(), 3003);
    }

    #[tokio::test]
    async fn test_skips_listening_ports() {
        let executor = ScriptedExecutor::new().ok("-iTCP:3001 ", "4242\n");
        let ports = allocator(executor, Settings::default());
        assert_eq!(ports.allocate(3001).await.unwrap(), 3002);
        assert!(!ports.is_reserved(3001));
    }

    #[tokio::test]
    async fn test_probe_failure_is_fail_open() {
        let executor = ScriptedExecutor::new().fail("lsof", "lsof: command not found");
        let ports = allocator(executor, Settings::default());
        assert_eq!(ports.allocate(3001).await.unwrap(), 3001);
    }

    #[tokio::test]
    async fn test_label_query_failure_still_allocates() {
        let executor = ScriptedExecutor::new().fail("ps -a", "daemon not running");
        let ports = allocator(executor, Settings::default());
        assert_eq!(ports.allocate(3001).await.unwrap(), 3001);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let executor = ScriptedExecutor::new().ok("lsof", "1\n");
        let settings = Settings {
            port_window: 3,
            ..Settings::default()
        };
        let ports = allocator(executor, settings);
        let err = ports.allocate(3001).await.unwrap_err();
        assert!(matches!(err, SandboxError::PortExhausted { start: 3001, window: 3 }));
        assert!(ports.reserved().is_empty());
    }

    #[tokio::test]
    async fn test_release_and_reallocate() {
        let ports = allocator(ScriptedExecutor::new(), Settings::default());
        let first = ports.allocate(3001).await.unwrap();
        assert_eq!(ports.allocate(3001).await.unwrap(), 3002);

        assert!(ports.release(first));
        assert!(!ports.release(first));
        assert!(!ports.release(9999));

        assert_eq!(ports.allocate(3001).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_try_reclaim() {
        let executor = ScriptedExecutor::new().ok("-iTCP:3005 ", "77\n");
        let ports = allocator(executor, Settings::default());

        assert!(ports.try_reclaim(3004).await);
        assert!(!ports.try_reclaim(3004).await);
        assert!(!ports.try_reclaim(3005).await);
        assert_eq!(ports.reserved(), vec![3004]);
    }

    #[tokio::test]
    async fn test_reclaim_owned_accepts_held_reservation() {
        let executor = ScriptedExecutor::new().ok("-iTCP:3002 ", "77\n");
        let ports = allocator(executor, Settings::default());

        assert_eq!(ports.allocate(3001).await.unwrap(), 3001);
        assert!(ports.reclaim_owned(3001).await);
        assert!(ports.reclaim_owned(3003).await);
        assert!(!ports.reclaim_owned(3002).await);
        assert_eq!(ports.reserved(), vec![3001, 3003]);
    }
}
