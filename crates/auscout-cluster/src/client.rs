//! Client side of the coordinator protocol

use crate::error::{ClusterError, Frame, WireError};
use crate::transport::RequestSender;
use crate::wire::{
    decode_u32, reply_string, ClientRequest, Toggles, CMD_QUERY, FAILED_ID, NOT_FOUND,
    UNRECOGNIZED,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Client {
    endpoint: RequestSender,
    timeout: Duration,
}

impl Client {
    /// `timeout` bounds each round trip and should exceed the coordinator's
    /// result wait
    pub fn new(endpoint: RequestSender, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// Submit a track; `None` when the coordinator refused it
    pub fn submit(&self, hashes: &[u32], metadata: &str) -> Result<Option<u32>, ClusterError> {
        let request = ClientRequest::Submit {
            hashes: hashes.to_vec(),
            metadata: metadata.to_string(),
        };
        let reply = self.endpoint.request(request.encode(), self.timeout)?;
        match reply.first().and_then(|part| decode_u32(part)) {
            Some(FAILED_ID) => Ok(None),
            Some(id) => Ok(Some(id)),
            None => Err(WireError::framing(Frame::TrackId, "expected 4 bytes").into()),
        }
    }

    /// Identify a hash sequence; `None` when nothing matched
    pub fn query(
        &self,
        hashes: &[u32],
        toggles: Option<Toggles>,
    ) -> Result<Option<String>, ClusterError> {
        let request = ClientRequest::Query {
            hashes: hashes.to_vec(),
            toggles,
        };
        let reply = self.endpoint.request(request.encode(), self.timeout)?;
        match reply.first().map(Vec::as_slice) {
            Some(NOT_FOUND) => Ok(None),
            Some(UNRECOGNIZED) => Err(WireError::UnknownCommand(CMD_QUERY).into()),
            Some(part) if !part.is_empty() => Ok(reply_string(&reply)),
            _ => Err(WireError::framing(Frame::Metadata, "empty reply").into()),
        }
    }
}
