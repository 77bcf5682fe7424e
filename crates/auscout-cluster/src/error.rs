//! Error types for the coordination layer

use auscout_db::StoreError;
use auscout_index::IndexError;
use std::fmt;
use thiserror::Error;

/// Logical part of a multi-part message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Topic,
    Command,
    Count,
    Hashes,
    ToggleCount,
    ToggleRow,
    Metadata,
    Slot,
    TrackId,
    Confidence,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frame::Topic => "topic",
            Frame::Command => "command",
            Frame::Count => "count",
            Frame::Hashes => "hashes",
            Frame::ToggleCount => "toggle count",
            Frame::ToggleRow => "toggle row",
            Frame::Metadata => "metadata",
            Frame::Slot => "slot",
            Frame::TrackId => "track id",
            Frame::Confidence => "confidence",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("malformed {frame} frame: {detail}")]
    Framing { frame: Frame, detail: String },

    #[error("unrecognized command {0}")]
    UnknownCommand(u8),
}

impl WireError {
    pub(crate) fn framing(frame: Frame, detail: impl Into<String>) -> Self {
        WireError::Framing {
            frame,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("peer disconnected")]
    Disconnected,

    #[error("registration failed: {0}")]
    Registration(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    #[error("thread {0} panicked")]
    Panicked(String),
}
