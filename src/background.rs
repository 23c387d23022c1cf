//! Expiry sweep for pending upload slots.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Registry;

/// Spawns the reaper. Every `period` it ages all slots by `step` seconds and
/// drops the ones that ran out. The task ends when `cancel` fires.
pub fn spawn_reaper(
    registry: Arc<Registry>,
    period: Duration,
    step: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("slot reaper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let expired = registry.sweep(step).await;
                    if !expired.is_empty() {
                        debug!(count = expired.len(), "expired pending uploads");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Slot;

    #[tokio::test]
    async fn reaper_expires_unclaimed_slots() {
        let registry = Arc::new(Registry::new());
        registry
            .insert(Slot::new("a.txt".to_string(), "http://host", 5, 30))
            .await
            .expect("insert");
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            registry.clone(),
            Duration::from_millis(10),
            10,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.claim("a.txt").await.is_none());

        cancel.cancel();
        handle.await.expect("reaper join");
    }

    #[tokio::test]
    async fn reaper_stops_on_cancel() {
        let registry = Arc::new(Registry::new());
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            registry.clone(),
            Duration::from_secs(3600),
            10,
            cancel.clone(),
        );
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper should stop promptly")
            .expect("reaper join");

        registry
            .insert(Slot::new("b.txt".to_string(), "http://host", 5, 10))
            .await
            .expect("insert");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.contains("b.txt").await);
    }

    #[tokio::test]
    async fn first_sweep_waits_one_period() {
        let registry = Arc::new(Registry::new());
        registry
            .insert(Slot::new("a.txt".to_string(), "http://host", 5, 10))
            .await
            .expect("insert");
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            registry.clone(),
            Duration::from_secs(3600),
            10,
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.contains("a.txt").await);
        cancel.cancel();
        handle.await.expect("reaper join");
    }
}
