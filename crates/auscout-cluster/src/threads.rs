//! Named thread groups with a shared stop signal

use crate::error::ClusterError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Threads started together and stopped together.
///
/// The stop signal is a channel nobody ever sends on: dropping the sender
/// disconnects every [`ThreadGroup::stop_signal`] receiver at once, which
/// wakes the loops selecting on it.
#[derive(Debug)]
pub struct ThreadGroup {
    stop: Option<Sender<()>>,
    stopped: Receiver<()>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for ThreadGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadGroup {
    pub fn new() -> Self {
        let (stop, stopped) = bounded(0);
        Self {
            stop: Some(stop),
            stopped,
            handles: Vec::new(),
        }
    }

    /// Receiver that disconnects once [`ThreadGroup::stop`] is called
    pub fn stop_signal(&self) -> Receiver<()> {
        self.stopped.clone()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), ClusterError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|source| ClusterError::Spawn {
                name: name.clone(),
                source,
            })?;
        self.handles.push((name, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every thread and wait for all of them
    pub fn stop(&mut self) -> Result<(), ClusterError> {
        self.stop.take();
        self.join()
    }

    /// Wait for every thread without signalling
    pub fn join(&mut self) -> Result<(), ClusterError> {
        let mut panicked = None;
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("thread {} panicked", name);
                panicked.get_or_insert(name);
            }
        }
        match panicked {
            Some(name) => Err(ClusterError::Panicked(name)),
            None => Ok(()),
        }
    }
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.stop();
        }
    }
}
