// SPDX-License-Identifier: MIT

use tracing::warn;

use crate::record::LogRecord;

/// Tracks call depth over a stream of records.
#[derive(Debug, Default, Clone)]
pub struct DepthTracker {
    depth: u64,
    mismatches: u64,
}

impl DepthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    /// Number of exits seen without a matching entry.
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    /// Apply `record` and return the depth before it, which is the depth an
    /// entry record is displayed at.
    pub fn observe(&mut self, seq: u64, record: &LogRecord) -> u64 {
        let before = self.depth;
        match record.tag.depth_delta() {
            1 => self.depth += 1,
            -1 => {
                if self.depth == 0 {
                    warn!("record {}: {} without a matching entry", seq, record.tag);
                    self.mismatches += 1;
                } else {
                    self.depth -= 1;
                }
            }
            _ => {}
        }
        before.min(self.depth)
    }
}
