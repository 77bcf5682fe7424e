//! Fuzzy lookup of a hash sequence against an index
//!
//! The query is consumed in blocks. Every hash (and its toggle candidates)
//! is looked up; hits for the same track whose positions keep moving
//! forward by at most two blocks extend a run. After each block the longest
//! run, relative to the block size, is the confidence; the first block that
//! reaches the threshold decides the match.

use crate::candidates::Candidates;
use crate::config::AuscoutConfig;
use auscout_index::HashLookup;
use serde::{Deserialize, Serialize};


/// Lookup tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    pub block_size: usize,
    /// Toggle bits expanded per frame
    pub toggles: usize,
    pub threshold: f32,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            block_size: 128,
            toggles: 0,
            threshold: 0.05,
        }
    }
}

impl MatchParams {
    pub fn from_config(config: &AuscoutConfig) -> Self {
        Self {
            block_size: config.lookup.block_size,
            toggles: config.hash.toggles,
            threshold: config.lookup.threshold,
        }
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    /// Matched track, when the confidence reached the threshold
    pub id: Option<u32>,
    /// Longest run divided by the block size
    pub confidence: f32,
}

impl LookupResult {
    pub fn no_match() -> Self {
        Self {
            id: None,
            confidence: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.id.is_some()
    }
}

/// Consecutive hits of one track
#[derive(Debug, Clone, Copy)]
struct Run {
    id: u32,
    count: u32,
    last: u32,
}

/// Per-lookup run table, bounded to `3 * block_size` runs
#[derive(Debug)]
struct Accumulator {
    runs: Vec<Run>,
    capacity: usize,
    window: u32,
    best: Option<usize>,
    best_count: u32,
}

impl Accumulator {
    fn new(block_size: usize) -> Self {
        let capacity = 3 * block_size;
        Self {
            runs: Vec::with_capacity(capacity),
            capacity,
            window: (2 * block_size).min(u32::MAX as usize) as u32,
            best: None,
            best_count: 0,
        }
    }

    fn hit(&mut self, id: u32, pos: u32) {
        let window = self.window;
        let found = self
            .runs
            .iter()
            .position(|r| r.id == id && pos > r.last && pos <= r.last.saturating_add(window));

        let slot = match found {
            Some(i) => {
                let run = &mut self.runs[i];
                run.count += 1;
                run.last = pos;
                i
            }
            None if self.runs.len() < self.capacity => {
                self.runs.push(Run { id, count: 1, last: pos });
                self.runs.len() - 1
            }
            None => return,
        };

        // first-seen wins ties
        if self.runs[slot].count > self.best_count {
            self.best_count = self.runs[slot].count;
            self.best = Some(slot);
        }
    }

    fn best_id(&self) -> Option<u32> {
        self.best.map(|i| self.runs[i].id)
    }
}

/// Block-wise fuzzy matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    params: MatchParams,
}

impl Matcher {
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Look `hashes` up in `index`.
    ///
    /// `toggles[i]` lists the unreliable bits of `hashes[i]`; frames without
    /// a row are probed with the hash alone.
    pub fn lookup<I: HashLookup + ?Sized>(
        &self,
        index: &I,
        hashes: &[u32],
        toggles: Option<&[Vec<u8>]>,
    ) -> LookupResult {
        let block = self.params.block_size;
        if block == 0 || hashes.len() < block {
            return LookupResult::no_match();
        }

        let mut acc = Accumulator::new(block);
        let mut level = 0.0f32;
        let mut start = 0;

        while start + block <= hashes.len() {
            for i in start..start + block {
                let row = toggles.and_then(|t| t.get(i)).map(|r| r.as_slice());
                for candidate in Candidates::new(hashes[i], row, self.params.toggles) {
                    if let Some(value) = index.lookup(candidate) {
                        acc.hit(value.id, value.pos);
                    }
                }
            }

            level = acc.best_count as f32 / block as f32;
            if level >= self.params.threshold {
                if let Some(id) = acc.best_id() {
                    log::debug!(
                        "matched track {} at block {} with confidence {:.3}",
                        id,
                        start / block,
                        level
                    );
                    return LookupResult {
                        id: Some(id),
                        confidence: level,
                    };
                }
            }
            start += block;
        }

        log::debug!("no match after {} blocks, level {:.3}", start / block, level);
        LookupResult {
            id: None,
            confidence: level,
        }
    }
}
