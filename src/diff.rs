// SPDX-License-Identifier: MIT

//! Shortest edit scripts between two logs.
//!
//! [`DiffContext`] owns everything one diff run needs: forward and backward
//! probe cursors for each log, a display cursor for each log, and the two
//! diagonal work arrays of the middle-snake search. The resulting script is
//! reported to a [`DiffHandler`] as an ordered sequence of common and
//! one-sided runs.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::logfile::{record_count, LogError};
use crate::record::LogRecord;
use crate::ring::RingBuffer;
use crate::utils::*;
use crate::Side;

mod myers;
pub mod render;

use myers::Diagonals;
pub use render::{RenderOptions, Renderer};

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("logs are too different: edit distance exceeds {max_d}")]
    TooDifferent { max_d: usize },
    #[error("invalid diff configuration: {0}")]
    Config(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Always find a shortest edit script.
    Exact,

    /// Once a middle-snake search has taken `threshold` steps in each
    /// direction, split at the furthest point reached instead of searching
    /// on. The script remains valid but may be longer than necessary.
    Heuristic { threshold: usize },
}

#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Largest edit distance the engine is willing to search for.
    pub max_d: usize,
    pub search: SearchPolicy,
    /// Capacity of each forward and backward probe cursor, in records.
    pub compare_window: usize,
    /// Capacity of each display cursor, in records.
    pub display_window: usize,
    pub prefetch: usize,
}
impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_d: 1_000_000,
            search: SearchPolicy::Exact,
            compare_window: 4096,
            display_window: 1024,
            prefetch: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffEvent {
    Common { a: u64, b: u64, len: u64 },
    OnlyIn { side: Side, start: u64, len: u64 },
}
impl DiffEvent {
    pub fn len(&self) -> u64 {
        match *self {
            DiffEvent::Common { len, .. } | DiffEvent::OnlyIn { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `next` to `self` if it directly continues it.
    fn try_extend(&mut self, next: &DiffEvent) -> bool {
        match (self, next) {
            (
                DiffEvent::Common { a, b, len },
                DiffEvent::Common { a: next_a, b: next_b, len: next_len },
            ) if *a + *len == *next_a && *b + *len == *next_b => {
                *len += next_len;
                true
            }
            (
                DiffEvent::OnlyIn { side, start, len },
                DiffEvent::OnlyIn { side: next_side, start: next_start, len: next_len },
            ) if side == next_side && *start + *len == *next_start => {
                *len += next_len;
                true
            }
            _ => false,
        }
    }
}

/// Number of one-sided records in an edit script.
pub fn edit_distance(events: &[DiffEvent]) -> u64 {
    events
        .iter()
        .map(|event| match event {
            DiffEvent::OnlyIn { len, .. } => *len,
            DiffEvent::Common { .. } => 0,
        })
        .sum()
}

/// Display cursors, one per log, handed to [`DiffHandler`]s so that they can
/// show the records an event refers to.
#[derive(Debug)]
pub struct DisplayCursors {
    rings: [RingBuffer; 2],
    prefetch: usize,
}
impl DisplayCursors {
    pub fn record(&mut self, side: Side, seq: u64) -> Result<LogRecord> {
        let record = self.rings[side.index()].get(seq, self.prefetch)?;
        Ok(record.ok_or(LogError::Truncated { seq })?)
    }
}

/// Receives the edit script of a diff run in order.
pub trait DiffHandler {
    fn handle_common(
        &mut self,
        display: &mut DisplayCursors,
        a: u64,
        b: u64,
        len: u64,
    ) -> Result<()>;

    fn handle_only_in(
        &mut self,
        display: &mut DisplayCursors,
        side: Side,
        start: u64,
        len: u64,
    ) -> Result<()>;

    fn finish(&mut self, _display: &mut DisplayCursors) -> Result<()> {
        Ok(())
    }
}

/// A [`DiffHandler`] that simply records all events.
#[derive(Debug, Default)]
pub struct EventCollector {
    pub events: Vec<DiffEvent>,
}
impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }
}
impl DiffHandler for EventCollector {
    fn handle_common(&mut self, _: &mut DisplayCursors, a: u64, b: u64, len: u64) -> Result<()> {
        self.events.push(DiffEvent::Common { a, b, len });
        Ok(())
    }

    fn handle_only_in(
        &mut self,
        _: &mut DisplayCursors,
        side: Side,
        start: u64,
        len: u64,
    ) -> Result<()> {
        self.events.push(DiffEvent::OnlyIn { side, start, len });
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct DiffStats {
    pub edit_distance: u64,
    pub middle_snakes: u64,
    pub heuristic_splits: u64,
    /// Largest edit distance of any subproblem split by a middle snake.
    pub max_snake_d: u64,
    pub max_depth: usize,
}

pub struct DiffContext {
    forward: [RingBuffer; 2],
    backward: [RingBuffer; 2],
    display: DisplayCursors,
    fdiag: Diagonals,
    bdiag: Diagonals,
    len: [u64; 2],
    config: DiffConfig,
    pending: Option<DiffEvent>,
    emitted: [u64; 2],
    depth: usize,
    stats: DiffStats,
}

impl DiffContext {
    pub fn open(a: &Path, b: &Path, config: DiffConfig) -> Result<Self> {
        if config.compare_window == 0 || config.display_window == 0 {
            Err(DiffError::Config("ring buffer windows must hold at least one record"))?;
        }
        if let SearchPolicy::Heuristic { threshold } = config.search {
            if threshold == 0 || threshold > config.max_d {
                Err(DiffError::Config("heuristic threshold must lie in 1..=max_d"))?;
            }
        }

        let paths = [a, b];
        let len = [
            with_path(a, || Ok(record_count(a)?))?,
            with_path(b, || Ok(record_count(b)?))?,
        ];
        let open = |side: Side, capacity: usize| -> Result<RingBuffer> {
            let path = paths[side.index()];
            with_path(path, || Ok(RingBuffer::new(path, capacity)?))
        };

        let window = config.compare_window;
        let forward = [open(Side::A, window)?, open(Side::B, window)?];
        let backward = [open(Side::A, window)?, open(Side::B, window)?];
        let display = DisplayCursors {
            rings: [open(Side::A, config.display_window)?, open(Side::B, config.display_window)?],
            prefetch: config.prefetch.min(config.display_window),
        };

        // No search needs more diagonals than there are records.
        let half = config.max_d.min((len[0] + len[1]).min(usize::MAX as u64 / 4) as usize);

        Ok(Self {
            forward,
            backward,
            display,
            fdiag: Diagonals::new(half),
            bdiag: Diagonals::new(half),
            len,
            config,
            pending: None,
            emitted: [0, 0],
            depth: 0,
            stats: DiffStats::default(),
        })
    }

    pub fn len(&self, side: Side) -> u64 {
        self.len[side.index()]
    }

    pub fn stats(&self) -> &DiffStats {
        &self.stats
    }

    /// Compute the edit script and feed it to `handler`.
    pub fn run(&mut self, handler: &mut dyn DiffHandler) -> Result<DiffStats> {
        self.pending = None;
        self.emitted = [0, 0];
        self.stats = DiffStats::default();

        self.compare(0, 0, self.len[0], self.len[1], handler)?;
        self.flush(handler)?;
        assert_eq!(self.emitted, self.len);
        handler.finish(&mut self.display)?;

        debug!(
            "diff done: edit distance {}, {} middle snakes, {} heuristic splits, depth {}",
            self.stats.edit_distance,
            self.stats.middle_snakes,
            self.stats.heuristic_splits,
            self.stats.max_depth
        );
        Ok(self.stats.clone())
    }

    fn emit(&mut self, event: DiffEvent, handler: &mut dyn DiffHandler) -> Result<()> {
        if event.is_empty() {
            return Ok(());
        }

        match event {
            DiffEvent::Common { a, b, len } => {
                assert_eq!([a, b], self.emitted);
                self.emitted = [a + len, b + len];
            }
            DiffEvent::OnlyIn { side, start, len } => {
                assert_eq!(start, self.emitted[side.index()]);
                self.emitted[side.index()] += len;
                self.stats.edit_distance += len;
            }
        }

        if let Some(pending) = &mut self.pending {
            if pending.try_extend(&event) {
                return Ok(());
            }
        }
        match self.pending.replace(event) {
            Some(previous) => self.deliver(previous, handler),
            None => Ok(()),
        }
    }

    fn flush(&mut self, handler: &mut dyn DiffHandler) -> Result<()> {
        match self.pending.take() {
            Some(event) => self.deliver(event, handler),
            None => Ok(()),
        }
    }

    fn deliver(&mut self, event: DiffEvent, handler: &mut dyn DiffHandler) -> Result<()> {
        match event {
            DiffEvent::Common { a, b, len } => handler.handle_common(&mut self.display, a, b, len),
            DiffEvent::OnlyIn { side, start, len } => {
                handler.handle_only_in(&mut self.display, side, start, len)
            }
        }
    }
}
