//! Message layouts and the frame parser
//!
//! Integers travel big-endian, confidences as big-endian IEEE-754 bits.
//! Every message is a sequence of parts; see the builders below for the
//! exact layouts.

use crate::error::{Frame, WireError};

/// A multi-part message, delivered atomically
pub type Multipart = Vec<Vec<u8>>;

pub const CMD_QUERY: u8 = 1;
pub const CMD_SUBMIT: u8 = 2;

/// Prefix every shard subscribes to
pub const TOPIC_PREFIX: &[u8] = b"phash.";
pub const TOPIC_QUERY: &[u8] = b"phash.q|";
pub const TOPIC_SUBMIT: &[u8] = b"phash.s|";

pub const INIT: &[u8] = b"INIT\0";
pub const KILL: &[u8] = b"KILL\0";

/// Shard id reply when no id is free
pub const REGISTRATION_FAILED: u8 = 0xFF;

pub const NOT_FOUND: &[u8] = b"not found\0";
pub const UNRECOGNIZED: &[u8] = b"unrecognized\0";

/// Track id reported for a failed submission
pub const FAILED_ID: u32 = 0;

pub fn encode_u32(v: u32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn decode_u32(bytes: &[u8]) -> Option<u32> {
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(arr))
}

pub fn encode_f32(v: f32) -> Vec<u8> {
    v.to_bits().to_be_bytes().to_vec()
}

pub fn decode_f32(bytes: &[u8]) -> Option<f32> {
    decode_u32(bytes).map(f32::from_bits)
}

pub fn encode_hashes(hashes: &[u32]) -> Vec<u8> {
    hashes.iter().flat_map(|h| h.to_be_bytes()).collect()
}

/// NUL-terminated string part
pub fn cstring(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    bytes
}

/// Toggle rows attached to a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggles {
    pub p: u8,
    pub rows: Vec<Vec<u8>>,
}

fn push_toggles(msg: &mut Multipart, toggles: &Option<Toggles>) {
    if let Some(t) = toggles {
        msg.push(vec![t.p]);
        msg.extend(t.rows.iter().cloned());
        msg.push(Vec::new());
    }
}

/// Request sent by a client to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    /// `[1][n][hashes]` + optional `[P][row]*n[empty]`
    Query {
        hashes: Vec<u32>,
        toggles: Option<Toggles>,
    },
    /// `[2][n][hashes][metadata\0]`
    Submit { hashes: Vec<u32>, metadata: String },
}

impl ClientRequest {
    pub fn encode(&self) -> Multipart {
        match self {
            ClientRequest::Query { hashes, toggles } => {
                let mut msg = vec![
                    vec![CMD_QUERY],
                    encode_u32(hashes.len() as u32),
                    encode_hashes(hashes),
                ];
                push_toggles(&mut msg, toggles);
                msg
            }
            ClientRequest::Submit { hashes, metadata } => vec![
                vec![CMD_SUBMIT],
                encode_u32(hashes.len() as u32),
                encode_hashes(hashes),
                cstring(metadata),
            ],
        }
    }

    pub fn parse(msg: Multipart) -> Result<Self, WireError> {
        let mut reader = FrameReader::new(msg);
        let cmd = reader.read_u8(Frame::Command)?;
        match cmd {
            CMD_QUERY => {
                let hashes = reader.read_hashes()?;
                let toggles = reader.read_toggles(hashes.len())?;
                Ok(ClientRequest::Query { hashes, toggles })
            }
            CMD_SUBMIT => {
                let hashes = reader.read_hashes()?;
                let metadata = reader.read_cstring(Frame::Metadata)?;
                Ok(ClientRequest::Submit { hashes, metadata })
            }
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

/// Message fanned out to shards:
/// `[topic][cmd][n][hashes][slot][id]` + optional toggles.
///
/// For queries `slot` is the coordinator worker awaiting the result; for
/// submissions it is the shard that must store the track.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardMessage {
    pub cmd: u8,
    pub hashes: Vec<u32>,
    pub slot: u8,
    pub id: u32,
    pub toggles: Option<Toggles>,
}

impl ShardMessage {
    pub fn topic(&self) -> &'static [u8] {
        if self.cmd == CMD_SUBMIT {
            TOPIC_SUBMIT
        } else {
            TOPIC_QUERY
        }
    }

    pub fn encode(&self) -> Multipart {
        let mut msg = vec![
            self.topic().to_vec(),
            vec![self.cmd],
            encode_u32(self.hashes.len() as u32),
            encode_hashes(&self.hashes),
            vec![self.slot],
            encode_u32(self.id),
        ];
        push_toggles(&mut msg, &self.toggles);
        msg
    }

    pub fn parse(msg: Multipart) -> Result<Self, WireError> {
        let mut reader = FrameReader::new(msg);
        let topic = reader.next_part(Frame::Topic)?;
        if !topic.starts_with(TOPIC_PREFIX) {
            return Err(WireError::framing(Frame::Topic, "unexpected topic"));
        }
        let cmd = reader.read_u8(Frame::Command)?;
        let hashes = reader.read_hashes()?;
        let slot = reader.read_u8(Frame::Slot)?;
        let id = reader.read_u32(Frame::TrackId)?;
        let toggles = reader.read_toggles(hashes.len())?;
        Ok(Self {
            cmd,
            hashes,
            slot,
            id,
            toggles,
        })
    }
}

/// Lookup result pushed by a shard: `[worker][id][cs]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultPush {
    pub worker: u8,
    pub id: u32,
    pub confidence: f32,
}

impl ResultPush {
    pub fn encode(&self) -> Multipart {
        vec![
            vec![self.worker],
            encode_u32(self.id),
            encode_f32(self.confidence),
        ]
    }

    pub fn parse(msg: Multipart) -> Result<Self, WireError> {
        let mut reader = FrameReader::new(msg);
        Ok(Self {
            worker: reader.read_u8(Frame::Slot)?,
            id: reader.read_u32(Frame::TrackId)?,
            confidence: reader.read_f32(Frame::Confidence)?,
        })
    }
}

/// Sequential reader over the parts of one message.
///
/// Parts left unread when the reader is dropped are discarded, so a
/// malformed message never leaks into the next one.
#[derive(Debug)]
pub struct FrameReader {
    parts: std::vec::IntoIter<Vec<u8>>,
}

impl FrameReader {
    pub fn new(msg: Multipart) -> Self {
        Self {
            parts: msg.into_iter(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub fn next_part(&mut self, frame: Frame) -> Result<Vec<u8>, WireError> {
        self.parts
            .next()
            .ok_or_else(|| WireError::framing(frame, "missing"))
    }

    pub fn read_u8(&mut self, frame: Frame) -> Result<u8, WireError> {
        match self.next_part(frame)?.as_slice() {
            [b] => Ok(*b),
            other => Err(WireError::framing(
                frame,
                format!("expected 1 byte, got {}", other.len()),
            )),
        }
    }

    pub fn read_u32(&mut self, frame: Frame) -> Result<u32, WireError> {
        let part = self.next_part(frame)?;
        decode_u32(&part)
            .ok_or_else(|| WireError::framing(frame, format!("expected 4 bytes, got {}", part.len())))
    }

    pub fn read_f32(&mut self, frame: Frame) -> Result<f32, WireError> {
        self.read_u32(frame).map(f32::from_bits)
    }

    /// `[n][n x u32]`
    pub fn read_hashes(&mut self) -> Result<Vec<u32>, WireError> {
        let n = self.read_u32(Frame::Count)? as usize;
        let part = self.next_part(Frame::Hashes)?;
        if part.len() != n * 4 {
            return Err(WireError::framing(
                Frame::Hashes,
                format!("{} bytes for {} hashes", part.len(), n),
            ));
        }
        Ok(part
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Optional `[P][row]*n[empty]`; missing rows are zero-filled and
    /// short rows zero-padded to `P` bytes.
    pub fn read_toggles(&mut self, n: usize) -> Result<Option<Toggles>, WireError> {
        let p = match self.parts.next() {
            None => return Ok(None),
            Some(part) if part.is_empty() => return Ok(None),
            Some(part) if part.len() == 1 => part[0],
            Some(part) => {
                return Err(WireError::framing(
                    Frame::ToggleCount,
                    format!("expected 1 byte, got {}", part.len()),
                ))
            }
        };

        let mut rows = Vec::with_capacity(n);
        while rows.len() < n {
            match self.parts.next() {
                Some(mut row) if !row.is_empty() => {
                    row.resize(p as usize, 0);
                    rows.push(row);
                }
                _ => break,
            }
        }
        rows.resize(n, vec![0; p as usize]);
        Ok(Some(Toggles { p, rows }))
    }

    /// NUL-terminated UTF-8 string
    pub fn read_cstring(&mut self, frame: Frame) -> Result<String, WireError> {
        let part = self.next_part(frame)?;
        let end = part.iter().position(|&b| b == 0).unwrap_or(part.len());
        String::from_utf8(part[..end].to_vec())
            .map_err(|_| WireError::framing(frame, "invalid utf-8"))
    }
}

/// String reply with the trailing NUL removed
pub fn reply_string(msg: &Multipart) -> Option<String> {
    let part = msg.first()?;
    let end = part.iter().position(|&b| b == 0).unwrap_or(part.len());
    Some(String::from_utf8_lossy(&part[..end]).into_owned())
}
