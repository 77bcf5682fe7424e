//! Table shard
//!
//! A shard owns two indexes under one base name: the durable `<base>.idx`,
//! mapped read-only and shared by all lookup threads, and the temporary
//! `<base>.tmp` that collects new submissions. Submissions become visible
//! to queries after [`Shard::flush`] folds the temporary index into the
//! durable one.

use crate::coordinator::ClusterLinks;
use crate::error::{ClusterError, Frame, WireError};
use crate::gate::AccessGate;
use crate::threads::ThreadGroup;
use crate::transport::RequestSender;
use crate::wire::{
    ResultPush, ShardMessage, CMD_QUERY, CMD_SUBMIT, INIT, KILL, REGISTRATION_FAILED, TOPIC_PREFIX,
};
use auscout_core::config::TableConfig;
use auscout_core::{AuscoutConfig, MatchParams, Matcher};
use auscout_index::{
    merge, IndexError, IndexStat, InsertReport, MergeStatus, MutableFileBackedIndex,
    ReadOnlyMappedIndex,
};
use crossbeam_channel::{select, unbounded, Receiver};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Deadline for the coordinator to acknowledge a result push
const RESULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    Registered,
    Active,
    Deregistering,
    Stopped,
}

/// `<base>.<ext>`, keeping any dots already in the base name
fn sibling(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Outcome counts of the submissions a shard has handled
#[derive(Debug, Default)]
struct InsertCounters {
    applied: AtomicU64,
    failed: AtomicU64,
}

impl InsertCounters {
    fn record(&self, outcome: &Result<InsertReport, IndexError>) {
        let counter = match outcome {
            Ok(_) => &self.applied,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

struct Tables {
    id: u8,
    main_path: PathBuf,
    tmp_path: PathBuf,
    main: RwLock<Arc<ReadOnlyMappedIndex>>,
    tmp: Mutex<MutableFileBackedIndex>,
    /// Lookups in the durable index
    readers: AccessGate,
    /// Inserts into the temporary index
    writer: AccessGate,
    params: MatchParams,
    table: TableConfig,
    results: RequestSender,
    inserts: InsertCounters,
}

pub struct Shard {
    tables: Arc<Tables>,
    control: RequestSender,
    control_timeout: Duration,
    state: Mutex<ShardState>,
    threads: ThreadGroup,
}

impl Shard {
    /// Open the indexes under `index_base`, register and start serving.
    ///
    /// A temporary index left over from an earlier run is merged first.
    pub fn start(
        config: &AuscoutConfig,
        index_base: &Path,
        links: &ClusterLinks,
    ) -> Result<Self, ClusterError> {
        let table = config.table.clone();
        let main_path = sibling(index_base, "idx");
        let tmp_path = sibling(index_base, "tmp");

        merge(&main_path, &tmp_path, table.main_buckets, Some(table.max_load))?;
        let main = ReadOnlyMappedIndex::open(&main_path, table.main_buckets)?;
        let tmp = MutableFileBackedIndex::open(&tmp_path, table.tmp_buckets)?;

        // subscribe before registering so no submission for our id is missed
        let subscription = links.hub.subscribe(TOPIC_PREFIX);
        let control_timeout = Duration::from_millis(config.server.registration_timeout_ms);
        let id = register(&links.control, control_timeout)?;
        log::info!(
            "shard {} serving {} ({} entries)",
            id,
            main_path.display(),
            main.stat().entries
        );

        let workers = table.worker_threads.max(1);
        let tables = Arc::new(Tables {
            id,
            main_path,
            tmp_path,
            main: RwLock::new(Arc::new(main)),
            tmp: Mutex::new(tmp),
            readers: AccessGate::new(workers),
            writer: AccessGate::new(1),
            params: MatchParams::from_config(config),
            table,
            results: links.results.clone(),
            inserts: InsertCounters::default(),
        });

        let mut shard = Self {
            tables,
            control: links.control.clone(),
            control_timeout,
            state: Mutex::new(ShardState::Registered),
            threads: ThreadGroup::new(),
        };

        let (dispatch, work) = unbounded::<ShardMessage>();
        let stop = shard.threads.stop_signal();
        let spawned = shard.threads.spawn(format!("shard{}-subscriber", id), move || {
            let inbox = subscription.receiver();
            loop {
                select! {
                    recv(inbox) -> msg => match msg {
                        Ok(msg) => match ShardMessage::parse(msg) {
                            Ok(msg) => {
                                if dispatch.send(msg).is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::debug!("shard {}: dropping message: {}", id, e),
                        },
                        Err(_) => break,
                    },
                    recv(stop) -> _ => break,
                }
            }
            // hand over what was already delivered before stopping
            for msg in inbox.try_iter() {
                if let Ok(msg) = ShardMessage::parse(msg) {
                    let _ = dispatch.send(msg);
                }
            }
        });
        if let Err(e) = spawned.and_then(|_| shard.spawn_workers(workers, work)) {
            shard.deregister();
            return Err(e);
        }

        *shard.state.lock() = ShardState::Active;
        Ok(shard)
    }

    fn spawn_workers(
        &mut self,
        workers: usize,
        work: Receiver<ShardMessage>,
    ) -> Result<(), ClusterError> {
        for n in 0..workers {
            let tables = Arc::clone(&self.tables);
            let work = work.clone();
            // runs until the subscriber drops the dispatch side
            self.threads
                .spawn(format!("shard{}-worker-{}", tables.id, n), move || {
                    for msg in work.iter() {
                        tables.handle(msg);
                    }
                })?;
        }
        Ok(())
    }

    pub fn id(&self) -> u8 {
        self.tables.id
    }

    pub fn state(&self) -> ShardState {
        *self.state.lock()
    }

    pub fn main_path(&self) -> &Path {
        &self.tables.main_path
    }

    /// Durable index statistics
    pub fn stat(&self) -> IndexStat {
        self.tables.main.read().stat()
    }

    /// Temporary index statistics
    pub fn pending(&self) -> IndexStat {
        self.tables.tmp.lock().stat()
    }

    /// Submissions inserted since start
    pub fn applied(&self) -> u64 {
        self.tables.inserts.applied()
    }

    /// Submissions whose insert failed since start
    pub fn failed(&self) -> u64 {
        self.tables.inserts.failed()
    }

    /// Fold the temporary index into the durable one and remap it.
    ///
    /// Waits for in-flight lookups and inserts to finish and holds both
    /// gates closed until done.
    pub fn flush(&self) -> Result<MergeStatus, ClusterError> {
        self.tables.flush()
    }

    /// Deregister, drain and persist the temporary index
    pub fn shutdown(mut self) -> Result<(), ClusterError> {
        *self.state.lock() = ShardState::Deregistering;
        self.deregister();

        let joined = self.threads.stop();
        {
            let _writer = self.tables.writer.drain();
            self.tables.tmp.lock().flush()?;
        }
        *self.state.lock() = ShardState::Stopped;
        log::info!("shard {} stopped", self.tables.id);
        joined
    }

    fn deregister(&self) {
        let msg = vec![KILL.to_vec(), vec![self.tables.id]];
        if let Err(e) = self.control.request(msg, self.control_timeout) {
            log::warn!("shard {}: deregistration failed: {}", self.tables.id, e);
        }
    }
}

fn register(control: &RequestSender, timeout: Duration) -> Result<u8, ClusterError> {
    let reply = control
        .request(vec![INIT.to_vec()], timeout)
        .map_err(|e| match e {
            ClusterError::Timeout(_) => ClusterError::Timeout("registration"),
            other => other,
        })?;

    match reply.first().map(Vec::as_slice) {
        Some([REGISTRATION_FAILED]) => {
            Err(ClusterError::Registration("no free shard id".to_string()))
        }
        Some([id]) => Ok(*id),
        _ => Err(WireError::framing(Frame::Slot, "expected 1 byte").into()),
    }
}

impl Tables {
    fn handle(&self, msg: ShardMessage) {
        match msg.cmd {
            CMD_QUERY => self.query(msg),
            CMD_SUBMIT if msg.slot == self.id => self.submit(msg),
            CMD_SUBMIT => {}
            other => log::debug!("shard {}: unrecognized command {}", self.id, other),
        }
    }

    fn query(&self, msg: ShardMessage) {
        let params = MatchParams {
            toggles: msg.toggles.as_ref().map_or(0, |t| t.p as usize),
            ..self.params
        };
        let rows = msg.toggles.as_ref().map(|t| t.rows.as_slice());

        let result = {
            let _reader = self.readers.enter();
            let main = self.main.read().clone();
            Matcher::new(params).lookup(main.as_ref(), &msg.hashes, rows)
        };

        let Some(id) = result.id else {
            return;
        };
        let push = ResultPush {
            worker: msg.slot,
            id,
            confidence: result.confidence,
        };
        log::debug!(
            "shard {}: track {} for worker {} ({:.3})",
            self.id,
            id,
            msg.slot,
            result.confidence
        );
        if let Err(e) = self.results.request(push.encode(), RESULT_PUSH_TIMEOUT) {
            log::warn!("shard {}: result push failed: {}", self.id, e);
        }
    }

    fn submit(&self, msg: ShardMessage) {
        let _writer = self.writer.enter();
        let outcome = self.tmp.lock().insert(msg.id, &msg.hashes);
        match &outcome {
            Ok(report) => log::debug!(
                "shard {}: track {} inserted {} overwritten {}",
                self.id,
                msg.id,
                report.inserted,
                report.overwritten
            ),
            Err(e) => log::warn!("shard {}: insert of track {} failed: {}", self.id, msg.id, e),
        }
        self.inserts.record(&outcome);
    }

    fn flush(&self) -> Result<MergeStatus, ClusterError> {
        let _writer = self.writer.drain();
        let _readers = self.readers.drain();

        let mut tmp = self.tmp.lock();
        tmp.flush()?;
        let status = merge(
            &self.main_path,
            &self.tmp_path,
            self.table.main_buckets,
            Some(self.table.max_load),
        )?;
        if let MergeStatus::Merged { records } = status {
            let remapped = ReadOnlyMappedIndex::open(&self.main_path, self.table.main_buckets)?;
            *self.main.write() = Arc::new(remapped);
            tmp.clear();
            log::info!("shard {}: flushed {} records", self.id, records);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::wire::{ClientRequest, FAILED_ID};
    use auscout_db::{AudioMetaData, InMemoryStore, MetadataStore};
    use std::time::Instant;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> AuscoutConfig {
        let mut config = AuscoutConfig::default();
        config.server.worker_threads = 2;
        config.server.result_wait_ms = 2000;
        config.table.worker_threads = 2;
        config.table.main_buckets = 1 << 10;
        config.table.tmp_buckets = 1 << 8;
        config.lookup.block_size = 16;
        config
    }

    fn track(seed: u32, len: usize) -> Vec<u32> {
        (0..len as u32)
            .map(|i| (seed.wrapping_mul(0x9E37_79B9) ^ i.wrapping_mul(0x85EB_CA6B)).rotate_left(seed % 31))
            .collect()
    }

    fn wait_applied(shard: &Shard, n: u64) {
        let deadline = Instant::now() + WAIT;
        while shard.applied() < n {
            assert!(Instant::now() < deadline, "submission never applied");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn submit(links: &ClusterLinks, hashes: &[u32], title: &str) -> u32 {
        let msg = ClientRequest::Submit {
            hashes: hashes.to_vec(),
            metadata: AudioMetaData {
                title1: title.to_string(),
                ..Default::default()
            }
            .to_inline(),
        }
        .encode();
        let reply = links.client.request(msg, WAIT).unwrap();
        crate::wire::decode_u32(&reply[0]).unwrap()
    }

    #[test]
    fn test_failed_insert_is_not_applied() {
        let counters = InsertCounters::default();
        counters.record(&Ok(InsertReport {
            inserted: 3,
            overwritten: 0,
        }));
        counters.record(&Err(IndexError::Capacity("out of memory".to_string())));
        counters.record(&Err(IndexError::Capacity("out of memory".to_string())));
        assert_eq!(counters.applied(), 1);
        assert_eq!(counters.failed(), 2);
    }

    #[test]
    fn test_sibling_keeps_dots() {
        assert_eq!(sibling(Path::new("/x/a.b"), "idx"), PathBuf::from("/x/a.b.idx"));
    }

    #[test]
    fn test_submit_flush_query() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let coordinator = Coordinator::start(&config(), store).unwrap();
        let links = coordinator.links();

        let shard = Shard::start(&config(), &dir.path().join("t"), &links).unwrap();
        assert_eq!(shard.id(), 0);
        assert_eq!(shard.state(), ShardState::Active);

        let hashes = track(7, 200);
        let id = submit(&links, &hashes, "Paper Moon");
        assert_ne!(id, FAILED_ID);
        wait_applied(&shard, 1);
        assert_eq!(shard.pending().entries, 200);
        assert_eq!(shard.stat().entries, 0);

        assert!(matches!(shard.flush().unwrap(), MergeStatus::Merged { records: 200 }));
        assert_eq!(shard.stat().entries, 200);
        assert_eq!(shard.pending().entries, 0);

        let query = ClientRequest::Query {
            hashes: hashes[40..120].to_vec(),
            toggles: None,
        }
        .encode();
        let reply = links.client.request(query, WAIT).unwrap();
        assert!(crate::wire::reply_string(&reply).unwrap().contains("Paper Moon"));

        shard.shutdown().unwrap();
        assert_eq!(coordinator.registry().active_count(), 0);
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_pending_submissions_survive_restart() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("t");
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let coordinator = Coordinator::start(&config(), store).unwrap();
        let links = coordinator.links();

        let shard = Shard::start(&config(), &base, &links).unwrap();
        submit(&links, &track(3, 50), "Blue Skies");
        wait_applied(&shard, 1);
        shard.shutdown().unwrap();

        // the restarted shard merges the persisted temporary index
        let shard = Shard::start(&config(), &base, &links).unwrap();
        assert_eq!(shard.stat().entries, 50);
        assert_eq!(shard.pending().entries, 0);
        assert!(matches!(shard.flush().unwrap(), MergeStatus::NothingToMerge));
        shard.shutdown().unwrap();
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_submission_for_other_shard_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let coordinator = Coordinator::start(&config(), store).unwrap();
        let links = coordinator.links();
        let shard = Shard::start(&config(), &dir.path().join("t"), &links).unwrap();

        let msg = ShardMessage {
            cmd: CMD_SUBMIT,
            hashes: vec![1, 2, 3],
            slot: shard.id().wrapping_add(1),
            id: 9,
            toggles: None,
        };
        links.hub.publish(&msg.encode());
        let own = ShardMessage {
            slot: shard.id(),
            ..msg
        };
        links.hub.publish(&own.encode());

        wait_applied(&shard, 1);
        assert_eq!(shard.applied(), 1);
        assert_eq!(shard.pending().entries, 3);

        shard.shutdown().unwrap();
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_registration_timeout() {
        let dir = TempDir::new().unwrap();
        let (control, _requests) = crate::transport::endpoint();
        let (client, _c) = crate::transport::endpoint();
        let (results, _r) = crate::transport::endpoint();
        let links = ClusterLinks {
            client,
            control,
            results,
            hub: crate::transport::Broadcast::new(),
        };
        let mut config = config();
        config.server.registration_timeout_ms = 50;

        assert!(matches!(
            Shard::start(&config, &dir.path().join("t"), &links),
            Err(ClusterError::Timeout("registration"))
        ));
    }
}
