//! Coordinator and table shards running in one process

use crate::client::Client;
use crate::coordinator::Coordinator;
use crate::error::ClusterError;
use crate::shard::Shard;
use auscout_core::AuscoutConfig;
use auscout_db::MetadataStore;
use auscout_index::MergeStatus;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slack added to the result wait for a client round trip
const CLIENT_SLACK: Duration = Duration::from_secs(5);

pub struct LocalCluster {
    coordinator: Coordinator,
    shards: Vec<Shard>,
    client_timeout: Duration,
}

impl LocalCluster {
    /// Start a coordinator and `shards` shards whose indexes live in `dir`
    /// as `<index_name>-<n>.idx` / `.tmp`
    pub fn start(
        config: &AuscoutConfig,
        store: Arc<dyn MetadataStore>,
        shards: usize,
        dir: &Path,
    ) -> Result<Self, ClusterError> {
        let coordinator = Coordinator::start(config, store)?;
        let links = coordinator.links();

        let mut started = Vec::with_capacity(shards);
        for n in 0..shards {
            let base = dir.join(format!("{}-{}", config.table.index_name, n));
            match Shard::start(config, &base, &links) {
                Ok(shard) => started.push(shard),
                Err(e) => {
                    log::error!("shard {} failed to start: {}", n, e);
                    for shard in started {
                        let _ = shard.shutdown();
                    }
                    let _ = coordinator.shutdown();
                    return Err(e);
                }
            }
        }

        Ok(Self {
            coordinator,
            shards: started,
            client_timeout: Duration::from_millis(config.server.result_wait_ms) + CLIENT_SLACK,
        })
    }

    pub fn client(&self) -> Client {
        Client::new(self.coordinator.links().client, self.client_timeout)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Wait until the shards have handled `n` submissions in total.
    ///
    /// Returns true only when all of them were inserted; a failed insert or
    /// the timeout yields false.
    pub fn wait_for_submissions(&self, n: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let applied: u64 = self.shards.iter().map(Shard::applied).sum();
            let failed = self.failed_submissions();
            if failed > 0 {
                log::warn!("{} submissions failed to reach their index", failed);
                return false;
            }
            if applied >= n {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Submissions whose insert failed on any shard
    pub fn failed_submissions(&self) -> u64 {
        self.shards.iter().map(Shard::failed).sum()
    }

    /// Flush every shard, returning the number of records merged
    pub fn flush(&self) -> Result<u64, ClusterError> {
        let mut merged = 0;
        for shard in &self.shards {
            if let MergeStatus::Merged { records } = shard.flush()? {
                merged += records;
            }
        }
        Ok(merged)
    }

    /// Stop the shards, then the coordinator
    pub fn shutdown(self) -> Result<(), ClusterError> {
        let mut first_error = None;
        for shard in self.shards {
            if let Err(e) = shard.shutdown() {
                log::error!("shard shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.coordinator.shutdown() {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
