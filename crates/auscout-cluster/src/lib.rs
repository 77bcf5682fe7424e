//! Distributed coordination for Audio Scout
//!
//! A [`Coordinator`] accepts client queries and submissions, fans them out
//! to the registered table [`Shard`]s over an in-process broadcast and
//! collects their lookup results. [`LocalCluster`] wires both together in
//! one process.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod local;
pub mod registry;
pub mod shard;
pub mod threads;
pub mod transport;
pub mod wire;

pub use client::Client;
pub use coordinator::{ClusterLinks, Coordinator};
pub use error::{ClusterError, Frame, WireError};
pub use gate::AccessGate;
pub use local::LocalCluster;
pub use registry::ShardRegistry;
pub use shard::{Shard, ShardState};
pub use wire::{ClientRequest, ResultPush, ShardMessage, Toggles};
