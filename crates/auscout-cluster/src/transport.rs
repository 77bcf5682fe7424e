//! In-process message transport
//!
//! Request/reply endpoints carry an [`Envelope`] holding the request and a
//! one-shot reply channel. [`Broadcast`] fans every published message out to
//! all subscribers whose prefix matches the first part.

use crate::error::ClusterError;
use crate::wire::Multipart;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A request together with the channel its reply goes to
#[derive(Debug)]
pub struct Envelope {
    pub msg: Multipart,
    reply: Sender<Multipart>,
}

impl Envelope {
    /// Answer the request; a requester that gave up is ignored
    pub fn reply(self, msg: Multipart) {
        let _ = self.reply.send(msg);
    }

    pub fn reply_empty(self) {
        self.reply(vec![Vec::new()]);
    }

    /// Split into the request and a reply handle
    pub fn split(self) -> (Multipart, Replier) {
        (self.msg, Replier(self.reply))
    }
}

/// Reply half of an [`Envelope`]
#[derive(Debug)]
pub struct Replier(Sender<Multipart>);

impl Replier {
    pub fn send(self, msg: Multipart) {
        let _ = self.0.send(msg);
    }

    pub fn send_empty(self) {
        self.send(vec![Vec::new()]);
    }
}

/// Client side of a request/reply endpoint
#[derive(Debug, Clone)]
pub struct RequestSender {
    tx: Sender<Envelope>,
}

/// New endpoint: requesters clone the sender, servers share the receiver
pub fn endpoint() -> (RequestSender, Receiver<Envelope>) {
    let (tx, rx) = unbounded();
    (RequestSender { tx }, rx)
}

impl RequestSender {
    /// Send `msg` and wait up to `timeout` for the reply
    pub fn request(&self, msg: Multipart, timeout: Duration) -> Result<Multipart, ClusterError> {
        let (reply, replies) = bounded(1);
        self.tx
            .send(Envelope { msg, reply })
            .map_err(|_| ClusterError::Disconnected)?;
        replies.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ClusterError::Timeout("reply"),
            RecvTimeoutError::Disconnected => ClusterError::Disconnected,
        })
    }
}

struct Subscriber {
    id: u64,
    prefix: Vec<u8>,
    tx: Sender<Multipart>,
}

/// Topic-filtered fan-out
#[derive(Default)]
pub struct Broadcast {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Receiving end of a subscription; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    hub: Arc<Broadcast>,
    rx: Receiver<Multipart>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<Multipart> {
        &self.rx
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

impl Broadcast {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Receive every message whose first part starts with `prefix`
    pub fn subscribe(self: &Arc<Self>, prefix: &[u8]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.subscribers.write().push(Subscriber {
            id,
            prefix: prefix.to_vec(),
            tx,
        });
        Subscription {
            id,
            hub: Arc::clone(self),
            rx,
        }
    }

    /// Drop subscriber `id`; its receiver disconnects once drained
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `msg` to every matching subscriber, returning how many got it
    pub fn publish(&self, msg: &Multipart) -> usize {
        let topic = msg.first().map(|p| p.as_slice()).unwrap_or(&[]);
        self.subscribers
            .read()
            .iter()
            .filter(|s| topic.starts_with(&s.prefix))
            .filter(|s| s.tx.send(msg.clone()).is_ok())
            .count()
    }
}
