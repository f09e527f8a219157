//! Shutdown coordination for the background sweep task.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::risk::RiskEngine;

/// Broadcast-based shutdown coordinator.
///
/// The gateway triggers it once when the server loop exits; every
/// spawned background task holds a receiver and stops on the signal.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal all subscribed tasks to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Spawn the risk sweeper bound to this coordinator. The returned
    /// handle resolves once the sweeper has observed the signal.
    pub fn spawn_sweeper(&self, risk: Arc<RiskEngine>) -> JoinHandle<()> {
        tokio::spawn(risk.run_sweeper(self.subscribe()))
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::config::schema::RiskConfig;
    use crate::risk::MemoryRiskStore;
    use crate::store::ManualClock;
    use std::time::Duration;

    fn engine() -> Arc<RiskEngine> {
        let config = RiskConfig::default();
        let store = Arc::new(MemoryRiskStore::new(
            config.suspicious_hourly_threshold,
            config.block_weight_threshold,
            config.max_tracked_ips,
        ));
        Arc::new(RiskEngine::new(
            store,
            config,
            Arc::new(MemorySink::new()),
            Arc::new(ManualClock::new(0)),
        ))
    }

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_trigger() {
        let shutdown = Shutdown::new();
        let handle = shutdown.spawn_sweeper(engine());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper exits on shutdown")
            .expect("sweeper task did not panic");
    }
}
