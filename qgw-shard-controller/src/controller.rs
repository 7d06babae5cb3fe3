//! The polling worker: every 30 seconds, snapshot the cluster, ask the
//! objective for the next batch of reroutes, submit them, and sleep
//! again — interruptibly, so a shutdown signal doesn't have to wait out
//! the full interval. Mirrors the original's `Thread.sleep` /
//! `please_stop` loop.

use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::cluster::ClusterClient;
use crate::error::Result;
use crate::objective::{Objective, ReplicaTargets};

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Controller<C> {
    client: C,
    targets: ReplicaTargets,
    max_concurrent_reroutes: usize,
}

impl<C: ClusterClient> Controller<C> {
    pub fn new(client: C, targets: ReplicaTargets, max_concurrent_reroutes: usize) -> Self {
        Controller { client, targets, max_concurrent_reroutes }
    }

    /// Runs until `shutdown` reports `true`. Allocation is disabled
    /// around each reroute submission so the cluster doesn't also try to
    /// rebalance the shards this controller is mid-move on, then
    /// re-enabled before the next sleep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.poll_once().await {
                error!("shard placement poll failed: {}", e);
            }

            tokio::select! {
                _ = sleep(POLL_INTERVAL) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shard placement controller shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<()> {
        let state = self.client.fetch().await?;
        let objective = Objective { state: &state, targets: &self.targets, max_concurrent_reroutes: self.max_concurrent_reroutes };
        let commands = objective.next_batch();
        if commands.is_empty() {
            return Ok(());
        }

        info!("submitting {} reroute command(s)", commands.len());
        self.client.set_allocation_enabled(false).await?;
        let result = self.client.submit_reroute(&commands).await;
        if let Err(e) = self.client.set_allocation_enabled(true).await {
            warn!("failed to re-enable allocation after reroute: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cluster::RerouteCmd;
    use crate::model::ClusterState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        polls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClusterClient for CountingClient {
        async fn cat_nodes(&self) -> Result<String> {
            Ok("n r d i hm\n".to_string())
        }
        async fn cat_shards(&self) -> Result<String> {
            Ok("index shard prirep state node store\n".to_string())
        }
        async fn submit_reroute(&self, _commands: &[RerouteCmd]) -> Result<()> {
            Ok(())
        }
        async fn set_allocation_enabled(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }
        async fn fetch(&self) -> Result<ClusterState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(ClusterState::default())
        }
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        let polls = Arc::new(AtomicUsize::new(0));
        let controller = Controller::new(CountingClient { polls: polls.clone() }, ReplicaTargets::new(), 10);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { controller.run(rx).await });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(polls.load(Ordering::SeqCst) >= 1);
    }
}
