// SPDX-License-Identifier: MIT

//! Removal of unmatchable records ahead of diffing.
//!
//! A record whose name never occurs in the other log can never be part of a
//! common subsequence. [`filter_unmatchable`] writes a cleaned copy of each
//! log without such records, plus a side file of [`RemovedRange`]s that lets
//! the renderer put them back where they were.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::logfile::{LogWriter, MappedLog};
use crate::record::LogRecord;
use crate::utils::*;
use crate::Side;

pub const REMOVED_RANGE_SIZE: usize = 16;

const BATCH_SIZE: usize = 4096;

/// A maximal run of records dropped from a log, in original sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedRange {
    pub start: u64,
    pub len: u64,
}

impl RemovedRange {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    fn to_bytes(self) -> [u8; REMOVED_RANGE_SIZE] {
        let mut bytes = [0u8; REMOVED_RANGE_SIZE];
        bytes[..8].copy_from_slice(&(self.start as i64).to_le_bytes());
        bytes[8..].copy_from_slice(&(self.len as i64).to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let start = read_i64_le(&bytes[..8]);
        let len = read_i64_le(&bytes[8..]);
        if start < 0 || len <= 0 {
            return Err(format!("invalid removed range {{start: {}, len: {}}}", start, len))?;
        }
        Ok(Self {
            start: start as u64,
            len: len as u64,
        })
    }
}

pub struct RemovedRangeWriter {
    out: BufWriter<File>,
    count: u64,
}

impl RemovedRangeWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = with_path(path, || Ok(File::create(path)?))?;
        Ok(Self {
            out: BufWriter::new(file),
            count: 0,
        })
    }

    pub fn push(&mut self, range: RemovedRange) -> Result<()> {
        self.out.write_all(&range.to_bytes())?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<u64> {
        let file = self.out.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(self.count)
    }
}

/// Streaming reader of a removed-range side file.
pub struct RemovedRangeReader {
    input: BufReader<File>,
    path: PathBuf,
    peeked: Option<RemovedRange>,
    last_end: u64,
}

impl RemovedRangeReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = with_path(path, || Ok(File::open(path)?))?;
        Ok(Self {
            input: BufReader::new(file),
            path: path.to_path_buf(),
            peeked: None,
            last_end: 0,
        })
    }

    fn read_one(&mut self) -> Result<Option<RemovedRange>> {
        let mut bytes = [0u8; REMOVED_RANGE_SIZE];
        let mut got = 0;
        while got < REMOVED_RANGE_SIZE {
            match self.input.read(&mut bytes[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        match got {
            0 => Ok(None),
            REMOVED_RANGE_SIZE => {
                let range = RemovedRange::from_bytes(&bytes)?;
                if range.start < self.last_end {
                    return Err("removed ranges out of order")?;
                }
                self.last_end = range.end();
                Ok(Some(range))
            }
            _ => Err("truncated removed range")?,
        }
    }

    pub fn peek(&mut self) -> Result<Option<RemovedRange>> {
        if self.peeked.is_none() {
            let path = self.path.clone();
            self.peeked = with_path(&path, || self.read_one())?;
        }
        Ok(self.peeked)
    }

    pub fn next(&mut self) -> Result<Option<RemovedRange>> {
        self.peek()?;
        Ok(self.peeked.take())
    }

    pub fn read_all(path: &Path) -> Result<Vec<RemovedRange>> {
        let mut reader = Self::open(path)?;
        let mut ranges = Vec::new();
        while let Some(range) = reader.next()? {
            ranges.push(range);
        }
        Ok(ranges)
    }
}

/// "Seen in log A / seen in log B" flags, two bits per name index.
#[derive(Debug, Default)]
struct SeenMap {
    bits: Vec<u8>,
}

impl SeenMap {
    fn mark(&mut self, index: u32, side: Side) {
        let slot = index as usize / 4;
        if slot >= self.bits.len() {
            self.bits.resize(slot + 1, 0);
        }
        self.bits[slot] |= 1 << ((index % 4) * 2 + side.index() as u32);
    }

    fn seen_both(&self, index: u32) -> bool {
        let flags = self.bits.get(index as usize / 4).copied().unwrap_or(0) >> ((index % 4) * 2);
        flags & 3 == 3
    }
}

/// Output files of one filter run.
#[derive(Debug, Clone)]
pub struct FilterPaths {
    pub cleaned: [PathBuf; 2],
    pub removed: [PathBuf; 2],
}

impl FilterPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cleaned: [dir.join("cleaned-a.log"), dir.join("cleaned-b.log")],
            removed: [dir.join("removed-a.ranges"), dir.join("removed-b.ranges")],
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: [u64; 2],
    pub removed: [u64; 2],
    pub ranges: [u64; 2],
}

pub fn filter_unmatchable(inputs: [&Path; 2], paths: &FilterPaths) -> Result<FilterStats> {
    let logs = [
        with_path(inputs[0], || Ok(MappedLog::open(inputs[0])?))?,
        with_path(inputs[1], || Ok(MappedLog::open(inputs[1])?))?,
    ];

    let mut seen = SeenMap::default();
    for side in Side::BOTH {
        let log = &logs[side.index()];
        with_path(log.path(), || {
            for record in log.iter() {
                seen.mark(record?.name_index(), side);
            }
            Ok(())
        })?;
    }
    debug!("seen map covers {} name indices", seen.bits.len() * 4);

    let mut stats = FilterStats::default();
    for side in Side::BOTH {
        let idx = side.index();
        let log = &logs[idx];
        let mut cleaned =
            with_path(&paths.cleaned[idx], || Ok(LogWriter::create(&paths.cleaned[idx])?))?;
        let mut removed = RemovedRangeWriter::create(&paths.removed[idx])?;

        with_path(log.path(), || {
            let mut batch: Vec<LogRecord> = Vec::with_capacity(BATCH_SIZE);
            let mut open: Option<RemovedRange> = None;

            for (seq, record) in log.iter().enumerate() {
                let record = record?;
                if seen.seen_both(record.name_index()) {
                    if let Some(range) = open.take() {
                        removed.push(range)?;
                    }
                    batch.push(record);
                    if batch.len() == BATCH_SIZE {
                        cleaned.append(&batch)?;
                        batch.clear();
                    }
                } else {
                    stats.removed[idx] += 1;
                    match &mut open {
                        Some(range) => range.len += 1,
                        None => {
                            open = Some(RemovedRange {
                                start: seq as u64,
                                len: 1,
                            })
                        }
                    }
                }
            }

            if let Some(range) = open {
                removed.push(range)?;
            }
            cleaned.append(&batch)?;
            Ok(())
        })?;

        stats.kept[idx] = cleaned.finish()?;
        stats.ranges[idx] = removed.finish()?;

        info!(
            "{}: kept {} of {} records, {} unmatchable in {} ranges",
            log.path().display(),
            stats.kept[idx],
            log.len(),
            stats.removed[idx],
            stats.ranges[idx]
        );
    }

    Ok(stats)
}
