//! Query coordinator
//!
//! Client requests are served by a pool of workers sharing one request
//! queue. Queries are broadcast to every table shard and answered with the
//! first result that clears the threshold; submissions are stored in the
//! metadata store and routed to one randomly chosen shard. Shards join and
//! leave through the control endpoint.

use crate::error::{ClusterError, Frame, WireError};
use crate::registry::{ShardRegistry, MAX_SHARDS};
use crate::threads::ThreadGroup;
use crate::transport::{endpoint, Broadcast, Envelope, Replier, RequestSender};
use crate::wire::{
    cstring, encode_u32, ClientRequest, FrameReader, Multipart, ResultPush, ShardMessage, Toggles,
    CMD_QUERY, CMD_SUBMIT, FAILED_ID, INIT, KILL, NOT_FOUND, REGISTRATION_FAILED, UNRECOGNIZED,
};
use auscout_core::AuscoutConfig;
use auscout_db::MetadataStore;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Endpoints through which clients and shards reach a coordinator
#[derive(Clone)]
pub struct ClusterLinks {
    /// Client queries and submissions
    pub client: RequestSender,
    /// Shard registration
    pub control: RequestSender,
    /// Shard lookup results
    pub results: RequestSender,
    /// Fan-out to the shards
    pub hub: Arc<Broadcast>,
}

/// State shared by the request workers
struct WorkerContext {
    registry: Arc<ShardRegistry>,
    store: Arc<dyn MetadataStore>,
    publish: Sender<Multipart>,
    result_wait: Duration,
}

pub struct Coordinator {
    links: ClusterLinks,
    registry: Arc<ShardRegistry>,
    threads: ThreadGroup,
}

impl Coordinator {
    /// Start the workers and listeners described by `config.server`
    pub fn start(
        config: &AuscoutConfig,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self, ClusterError> {
        let workers = config.server.worker_threads;
        if workers == 0 || workers > MAX_SHARDS {
            return Err(ClusterError::Config(format!(
                "coordinator needs 1..={} workers, got {}",
                MAX_SHARDS, workers
            )));
        }

        let (client, requests) = endpoint();
        let (control, control_requests) = endpoint();
        let (results, result_pushes) = endpoint();
        let hub = Broadcast::new();
        let (publish, outbound) = unbounded::<Multipart>();
        let registry = Arc::new(ShardRegistry::new());
        let mut threads = ThreadGroup::new();

        let context = Arc::new(WorkerContext {
            registry: Arc::clone(&registry),
            store,
            publish,
            result_wait: Duration::from_millis(config.server.result_wait_ms),
        });

        let mut result_routes = Vec::with_capacity(workers);
        for slot in 0..workers {
            let (route, inbox) = unbounded::<(u32, f32)>();
            result_routes.push(route);

            let context = Arc::clone(&context);
            let requests = requests.clone();
            let stop = threads.stop_signal();
            threads.spawn(format!("coord-worker-{}", slot), move || {
                run_worker(&context, slot as u8, &requests, &inbox, &stop)
            })?;
        }

        {
            let hub = Arc::clone(&hub);
            let stop = threads.stop_signal();
            threads.spawn("coord-forwarder", move || loop {
                select! {
                    recv(outbound) -> msg => match msg {
                        Ok(msg) => {
                            let delivered = hub.publish(&msg);
                            log::debug!("forwarded message to {} shards", delivered);
                        }
                        Err(_) => break,
                    },
                    recv(stop) -> _ => break,
                }
            })?;
        }

        {
            let threshold = config.lookup.threshold;
            let stop = threads.stop_signal();
            threads.spawn("coord-results", move || loop {
                select! {
                    recv(result_pushes) -> env => match env {
                        Ok(env) => {
                            route_result(env, &result_routes, threshold);
                        }
                        Err(_) => break,
                    },
                    recv(stop) -> _ => break,
                }
            })?;
        }

        {
            let registry = Arc::clone(&registry);
            let stop = threads.stop_signal();
            threads.spawn("coord-control", move || loop {
                select! {
                    recv(control_requests) -> env => match env {
                        Ok(env) => handle_control(env, &registry),
                        Err(_) => break,
                    },
                    recv(stop) -> _ => break,
                }
            })?;
        }

        log::info!("coordinator started with {} workers", workers);

        Ok(Self {
            links: ClusterLinks {
                client,
                control,
                results,
                hub,
            },
            registry,
            threads,
        })
    }

    pub fn links(&self) -> ClusterLinks {
        self.links.clone()
    }

    pub fn registry(&self) -> &ShardRegistry {
        &self.registry
    }

    /// Stop every thread; requests still queued are dropped
    pub fn shutdown(mut self) -> Result<(), ClusterError> {
        log::info!("coordinator shutting down");
        self.threads.stop()
    }
}

fn run_worker(
    context: &WorkerContext,
    slot: u8,
    requests: &Receiver<Envelope>,
    inbox: &Receiver<(u32, f32)>,
    stop: &Receiver<()>,
) {
    loop {
        select! {
            recv(requests) -> env => match env {
                Ok(env) => {
                    let (msg, replier) = env.split();
                    context.serve(slot, msg, replier, inbox);
                }
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    log::debug!("coordinator worker {} exiting", slot);
}

impl WorkerContext {
    fn serve(&self, slot: u8, msg: Multipart, replier: Replier, inbox: &Receiver<(u32, f32)>) {
        match ClientRequest::parse(msg) {
            Ok(ClientRequest::Query { hashes, toggles }) => {
                replier.send(vec![self.query(slot, hashes, toggles, inbox)])
            }
            Ok(ClientRequest::Submit { hashes, metadata }) => {
                replier.send(vec![encode_u32(self.submit(hashes, &metadata))])
            }
            Err(WireError::UnknownCommand(cmd)) => {
                log::warn!("worker {}: unrecognized command {}", slot, cmd);
                replier.send(vec![UNRECOGNIZED.to_vec()]);
            }
            Err(e) => {
                log::debug!("worker {}: dropping request: {}", slot, e);
                replier.send_empty();
            }
        }
    }

    fn query(
        &self,
        slot: u8,
        hashes: Vec<u32>,
        toggles: Option<Toggles>,
        inbox: &Receiver<(u32, f32)>,
    ) -> Vec<u8> {
        // results of an earlier query that arrived after its deadline
        let stale = inbox.try_iter().count();
        if stale > 0 {
            log::debug!("worker {}: discarded {} stale results", slot, stale);
        }

        if self.registry.active_count() == 0 {
            log::debug!("worker {}: no active shards", slot);
            return NOT_FOUND.to_vec();
        }

        let n = hashes.len();
        let msg = ShardMessage {
            cmd: CMD_QUERY,
            hashes,
            slot,
            id: 0,
            toggles,
        };
        if self.publish.send(msg.encode()).is_err() {
            return NOT_FOUND.to_vec();
        }

        let (id, confidence) = match inbox.recv_timeout(self.result_wait) {
            Ok(hit) => hit,
            Err(_) => {
                log::debug!("worker {}: no match for {} hashes", slot, n);
                return NOT_FOUND.to_vec();
            }
        };

        match self.store.lookup(id) {
            Ok(Some(inline)) => {
                log::info!("worker {}: matched track {} ({:.3})", slot, id, confidence);
                cstring(&inline)
            }
            Ok(None) => {
                log::warn!("worker {}: track {} has no metadata", slot, id);
                NOT_FOUND.to_vec()
            }
            Err(e) => {
                log::warn!("worker {}: metadata lookup for {} failed: {}", slot, id, e);
                NOT_FOUND.to_vec()
            }
        }
    }

    fn submit(&self, hashes: Vec<u32>, metadata: &str) -> u32 {
        let Some(table) = self.registry.select() else {
            log::warn!("submission rejected: no active shards");
            return FAILED_ID;
        };

        let id = match self.store.store(metadata) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("submission rejected: {}", e);
                return FAILED_ID;
            }
        };

        let msg = ShardMessage {
            cmd: CMD_SUBMIT,
            hashes,
            slot: table,
            id,
            toggles: None,
        };
        if self.publish.send(msg.encode()).is_err() {
            return FAILED_ID;
        }
        log::info!("submitted track {} to shard {}", id, table);
        id
    }
}

/// Where a result push ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routed {
    Delivered,
    BelowThreshold,
    /// Worker slot out of range or its thread has exited
    NoWorker,
    Malformed,
}

fn route_result(env: Envelope, routes: &[Sender<(u32, f32)>], threshold: f32) -> Routed {
    let (msg, replier) = env.split();
    replier.send_empty();

    let push = match ResultPush::parse(msg) {
        Ok(push) => push,
        Err(e) => {
            log::debug!("dropping result: {}", e);
            return Routed::Malformed;
        }
    };
    if push.confidence < threshold {
        log::debug!("result {} below threshold ({:.3})", push.id, push.confidence);
        return Routed::BelowThreshold;
    }
    let Some(route) = routes.get(push.worker as usize) else {
        log::warn!("result for unknown worker {}", push.worker);
        return Routed::NoWorker;
    };
    match route.send((push.id, push.confidence)) {
        Ok(()) => Routed::Delivered,
        Err(_) => {
            log::debug!("worker {} gone, dropping result {}", push.worker, push.id);
            Routed::NoWorker
        }
    }
}

fn handle_control(env: Envelope, registry: &ShardRegistry) {
    let (msg, replier) = env.split();
    let mut reader = FrameReader::new(msg);

    match reader.next_part(Frame::Command) {
        Ok(cmd) if cmd == INIT => {
            let id = match registry.register() {
                Some(id) => {
                    log::info!("shard {} registered", id);
                    id
                }
                None => {
                    log::warn!("shard registration refused: no free ids");
                    REGISTRATION_FAILED
                }
            };
            replier.send(vec![vec![id]]);
        }
        Ok(cmd) if cmd == KILL => {
            match reader.read_u8(Frame::Slot) {
                Ok(id) if registry.deregister(id) => log::info!("shard {} deregistered", id),
                Ok(id) => log::warn!("deregistration of unknown shard {}", id),
                Err(e) => log::debug!("malformed deregistration: {}", e),
            }
            replier.send_empty();
        }
        Ok(_) => replier.send(vec![UNRECOGNIZED.to_vec()]),
        Err(e) => {
            log::debug!("malformed control message: {}", e);
            replier.send_empty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_u32, reply_string, TOPIC_PREFIX};
    use auscout_db::{AudioMetaData, InMemoryStore};

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> AuscoutConfig {
        let mut config = AuscoutConfig::default();
        config.server.worker_threads = 2;
        config.server.result_wait_ms = 300;
        config
    }

    fn start() -> (Coordinator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = Coordinator::start(&config(), store.clone()).unwrap();
        (coordinator, store)
    }

    fn register(links: &ClusterLinks) -> u8 {
        links.control.request(vec![INIT.to_vec()], WAIT).unwrap()[0][0]
    }

    #[test]
    fn test_registration_and_deregistration() {
        let (coordinator, _) = start();
        let links = coordinator.links();

        assert_eq!(register(&links), 0);
        assert_eq!(register(&links), 1);
        assert_eq!(coordinator.registry().active_count(), 2);

        let ack = links
            .control
            .request(vec![KILL.to_vec(), vec![0]], WAIT)
            .unwrap();
        assert_eq!(ack, vec![Vec::<u8>::new()]);
        assert_eq!(coordinator.registry().active_ids(), vec![1]);
        assert_eq!(register(&links), 0);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_submit_without_shards_fails() {
        let (coordinator, store) = start();
        let links = coordinator.links();

        let msg = ClientRequest::Submit {
            hashes: vec![1, 2, 3],
            metadata: AudioMetaData::default().to_inline(),
        }
        .encode();
        let reply = links.client.request(msg, WAIT).unwrap();
        assert_eq!(decode_u32(&reply[0]), Some(FAILED_ID));
        assert!(store.is_empty());

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_submit_routes_to_registered_shard() {
        let (coordinator, store) = start();
        let links = coordinator.links();
        let sub = links.hub.subscribe(TOPIC_PREFIX);
        let shard = register(&links);

        let msg = ClientRequest::Submit {
            hashes: vec![10, 20],
            metadata: AudioMetaData {
                title1: "Night Train".into(),
                ..Default::default()
            }
            .to_inline(),
        }
        .encode();
        let reply = links.client.request(msg, WAIT).unwrap();
        assert_eq!(decode_u32(&reply[0]), Some(1));
        assert_eq!(store.len(), 1);

        let forwarded = ShardMessage::parse(sub.receiver().recv_timeout(WAIT).unwrap()).unwrap();
        assert_eq!(forwarded.cmd, CMD_SUBMIT);
        assert_eq!(forwarded.slot, shard);
        assert_eq!(forwarded.id, 1);
        assert_eq!(forwarded.hashes, vec![10, 20]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_malformed_metadata_returns_failed_id() {
        let (coordinator, store) = start();
        let links = coordinator.links();
        register(&links);

        let msg = ClientRequest::Submit {
            hashes: vec![1],
            metadata: "no separators".into(),
        }
        .encode();
        let reply = links.client.request(msg, WAIT).unwrap();
        assert_eq!(decode_u32(&reply[0]), Some(FAILED_ID));
        assert!(store.is_empty());

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_query_answered_by_result_push() {
        let (coordinator, store) = start();
        let links = coordinator.links();
        let sub = links.hub.subscribe(TOPIC_PREFIX);
        register(&links);

        let inline = AudioMetaData {
            title1: "Harbour Lights".into(),
            ..Default::default()
        }
        .to_inline();
        let id = store.store(&inline).unwrap();

        // stand-in shard answering every query with a hit
        let results = links.results.clone();
        let responder = std::thread::spawn(move || {
            let msg = ShardMessage::parse(sub.receiver().recv_timeout(WAIT).unwrap()).unwrap();
            let push = ResultPush {
                worker: msg.slot,
                id,
                confidence: 0.5,
            };
            results.request(push.encode(), WAIT).unwrap()
        });

        let query = ClientRequest::Query {
            hashes: vec![5; 4],
            toggles: None,
        }
        .encode();
        let reply = links.client.request(query, WAIT).unwrap();
        let text = reply_string(&reply).unwrap();
        assert!(text.contains("Harbour Lights"));

        assert_eq!(responder.join().unwrap(), vec![Vec::<u8>::new()]);
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_query_times_out_as_not_found() {
        let (coordinator, _) = start();
        let links = coordinator.links();
        register(&links);

        let query = ClientRequest::Query {
            hashes: vec![1, 2],
            toggles: None,
        }
        .encode();
        let reply = links.client.request(query, WAIT).unwrap();
        assert_eq!(reply, vec![NOT_FOUND.to_vec()]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_low_confidence_result_is_ignored() {
        let (coordinator, _) = start();
        let links = coordinator.links();

        let push = ResultPush {
            worker: 0,
            id: 1,
            confidence: 0.01,
        };
        let ack = links.results.request(push.encode(), WAIT).unwrap();
        assert_eq!(ack, vec![Vec::<u8>::new()]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_route_result_outcomes() {
        let (live_tx, live_rx) = unbounded();
        let (gone_tx, gone_rx) = unbounded();
        drop(gone_rx);
        let routes = vec![live_tx, gone_tx];

        let route = |worker: u8, confidence: f32| {
            let (sender, inbox) = endpoint();
            let push = ResultPush {
                worker,
                id: 9,
                confidence,
            };
            let pusher = std::thread::spawn(move || sender.request(push.encode(), WAIT));
            let env = inbox.recv_timeout(WAIT).unwrap();
            let routed = route_result(env, &routes, 0.2);
            assert_eq!(pusher.join().unwrap().unwrap(), vec![Vec::<u8>::new()]);
            routed
        };

        assert_eq!(route(0, 0.5), Routed::Delivered);
        assert_eq!(live_rx.try_recv().unwrap(), (9, 0.5));
        assert_eq!(route(0, 0.1), Routed::BelowThreshold);
        assert_eq!(route(1, 0.5), Routed::NoWorker);
        assert_eq!(route(7, 0.5), Routed::NoWorker);
        assert!(live_rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_and_malformed_requests() {
        let (coordinator, _) = start();
        let links = coordinator.links();

        let reply = links.client.request(vec![vec![7]], WAIT).unwrap();
        assert_eq!(reply, vec![UNRECOGNIZED.to_vec()]);

        let truncated = vec![vec![CMD_QUERY], encode_u32(3)];
        let reply = links.client.request(truncated, WAIT).unwrap();
        assert_eq!(reply, vec![Vec::<u8>::new()]);

        // workers survive bad requests
        let reply = links.client.request(vec![vec![7]], WAIT).unwrap();
        assert_eq!(reply, vec![UNRECOGNIZED.to_vec()]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_rejects_too_many_workers() {
        let mut config = config();
        config.server.worker_threads = 300;
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        assert!(matches!(
            Coordinator::start(&config, store),
            Err(ClusterError::Config(_))
        ));
    }
}
