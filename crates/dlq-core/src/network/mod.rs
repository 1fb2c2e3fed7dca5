//! Network reachability signal feeding the scheduler's global-pause-on-loss
//! behavior.

use std::time::Duration;

use async_trait::async_trait;

/// Port for "is the network usable right now". Implemented by
/// [`TcpProbeMonitor`] for real use and by a manually-driven fake in tests,
/// the same split the Transport trait uses.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Polls reachability by opening a TCP connection to a small set of
/// well-known hosts. Any single success counts as "available".
pub struct TcpProbeMonitor {
    probe_targets: Vec<String>,
    timeout: Duration,
}

impl TcpProbeMonitor {
    pub fn new(probe_targets: Vec<String>, timeout: Duration) -> Self {
        Self { probe_targets, timeout }
    }
}

impl Default for TcpProbeMonitor {
    fn default() -> Self {
        Self::new(
            vec!["1.1.1.1:443".into(), "8.8.8.8:443".into()],
            Duration::from_secs(3),
        )
    }
}

#[async_trait]
impl NetworkMonitor for TcpProbeMonitor {
    async fn is_available(&self) -> bool {
        for target in &self.probe_targets {
            let attempt = tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(target));
            if matches!(attempt.await, Ok(Ok(_))) {
                return true;
            }
        }
        false
    }
}

/// Manually-driven monitor for tests and for the scheduler's own unit tests.
#[derive(Debug, Default)]
pub struct FakeNetworkMonitor {
    available: std::sync::atomic::AtomicBool,
}

impl FakeNetworkMonitor {
    pub fn new(available: bool) -> Self {
        Self {
            available: std::sync::atomic::AtomicBool::new(available),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkMonitor for FakeNetworkMonitor {
    async fn is_available(&self) -> bool {
        self.available.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_monitor_reflects_set_state() {
        let monitor = FakeNetworkMonitor::new(true);
        assert!(monitor.is_available().await);
        monitor.set_available(false);
        assert!(!monitor.is_available().await);
    }
}
