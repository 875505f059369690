// SPDX-License-Identifier: MIT

//! A bounded-memory, bidirectional window over a log file.
//!
//! The window is an array of `capacity` record slots used circularly. The
//! cursor slot `cur` holds the record with sequence number `seq`, if that
//! record is resident. `before` records are resident directly ahead of the
//! cursor slot (sequence numbers `seq - before .. seq`) and `after` records
//! starting at the cursor slot (sequence numbers `seq .. seq + after`). The
//! remaining slots are free.
//!
//! Invariant: `before + after <= capacity`. Refilling in one direction evicts
//! records on the other side of the cursor when the window is full.

use std::path::Path;

use crate::logfile::{LogError, LogReader};
use crate::record::{LogRecord, RECORD_SIZE};

#[derive(Debug)]
pub struct RingBuffer {
    reader: LogReader,
    buf: Vec<LogRecord>,
    cur: usize,
    before: usize,
    after: usize,
    seq: u64,
    len: u64, // whole records in the file when it was opened
}

impl RingBuffer {
    pub fn new(path: &Path, capacity: usize) -> Result<Self, LogError> {
        assert!(capacity >= 1, "ring buffer capacity must be at least 1");
        let reader = LogReader::open(path)?;
        let len = std::fs::metadata(path)?.len() / RECORD_SIZE as u64;
        Ok(Self {
            reader,
            buf: vec![LogRecord::default(); capacity],
            cur: 0,
            before: 0,
            after: 0,
            seq: 0,
            len,
        })
    }

    /// Number of records in the file.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Sequence number of the record the cursor refers to.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn avail_before(&self) -> usize {
        self.before
    }

    pub fn avail_after(&self) -> usize {
        self.after
    }

    pub fn cur_index(&self) -> usize {
        self.cur
    }

    pub fn start_index(&self) -> usize {
        (self.cur + self.capacity() - self.before) % self.capacity()
    }

    pub fn end_index(&self) -> usize {
        (self.cur + self.after) % self.capacity()
    }

    /// Whether the resident records wrap around the end of the slot array.
    pub fn is_wrapped(&self) -> bool {
        self.start_index() + self.before + self.after > self.capacity()
    }

    fn check_geometry(&self) {
        assert!(self.cur < self.capacity());
        assert!(self.before + self.after <= self.capacity());
        assert!(self.before as u64 <= self.seq);
    }

    fn discard(&mut self) {
        self.cur = 0;
        self.before = 0;
        self.after = 0;
    }

    /// Move the cursor to `seq`.
    ///
    /// Resident records are kept if `seq` lies within the window. Otherwise
    /// the window is discarded and the next refill starts at `seq`. Targets
    /// past the end of the file are clamped to the end.
    pub fn seek(&mut self, seq: u64) {
        let seq = seq.min(self.len);
        let cap = self.capacity();
        if seq >= self.seq {
            let delta = seq - self.seq;
            if delta <= self.after as u64 {
                let delta = delta as usize;
                self.cur = (self.cur + delta) % cap;
                self.before += delta;
                self.after -= delta;
                self.seq = seq;
                return;
            }
        } else {
            let delta = self.seq - seq;
            if delta <= self.before as u64 {
                let delta = delta as usize;
                self.cur = (self.cur + cap - delta) % cap;
                self.before -= delta;
                self.after += delta;
                self.seq = seq;
                return;
            }
        }

        self.discard();
        self.seq = seq;
    }

    /// Return the record at the cursor and advance the cursor.
    ///
    /// If no record is resident at the cursor, up to `prefetch` records are
    /// read from the file first. Returns `None` at the end of the file.
    pub fn next(&mut self, prefetch: usize) -> Result<Option<&LogRecord>, LogError> {
        if self.after == 0 {
            self.fill(prefetch.max(1) as isize)?;
            if self.after == 0 {
                return Ok(None);
            }
        }

        let slot = self.cur;
        self.cur = (self.cur + 1) % self.capacity();
        self.before += 1;
        self.after -= 1;
        self.seq += 1;
        Ok(Some(&self.buf[slot]))
    }

    /// Move the cursor back and return the record it then refers to.
    ///
    /// Returns `None` at the start of the file.
    pub fn prev(&mut self, prefetch: usize) -> Result<Option<&LogRecord>, LogError> {
        if self.before == 0 {
            if self.seq == 0 {
                return Ok(None);
            }
            self.fill(-(prefetch.max(1) as isize))?;
            assert!(self.before > 0);
        }

        self.cur = (self.cur + self.capacity() - 1) % self.capacity();
        self.before -= 1;
        self.after += 1;
        self.seq -= 1;
        Ok(Some(&self.buf[self.cur]))
    }

    /// Read the record at `seq`, leaving the cursor just after it.
    pub fn get(&mut self, seq: u64, prefetch: usize) -> Result<Option<LogRecord>, LogError> {
        self.seek(seq);
        Ok(self.next(prefetch)?.copied())
    }

    /// Extend the window by up to `n` records past its end (`n > 0`) or
    /// before its start (`n < 0`). Returns the number of records read.
    pub fn fill(&mut self, n: isize) -> Result<usize, LogError> {
        let result = if n >= 0 {
            self.fill_forward(n as usize)
        } else {
            self.fill_backward(n.unsigned_abs())
        };
        match result {
            Ok(got) => {
                self.check_geometry();
                Ok(got)
            }
            Err(err) => {
                self.discard();
                Err(err)
            }
        }
    }

    fn fill_forward(&mut self, n: usize) -> Result<usize, LogError> {
        let cap = self.capacity();
        let want = n.min(cap - self.after);
        if want == 0 {
            return Ok(0);
        }

        let free = cap - self.before - self.after;
        self.reader.seek(self.seq + self.after as u64)?;
        let got = self.read_slots(self.end_index(), want)?;

        // Slots past the free region held the oldest records before the cursor.
        if got > free {
            self.before -= got - free;
        }
        self.after += got;
        Ok(got)
    }

    fn fill_backward(&mut self, n: usize) -> Result<usize, LogError> {
        let cap = self.capacity();
        let first_seq = self.seq - self.before as u64;
        let want = n.min(cap - self.before).min(first_seq.min(usize::MAX as u64) as usize);
        if want == 0 {
            return Ok(0);
        }

        let free = cap - self.before - self.after;
        if want > free {
            self.after -= want - free;
        }

        let new_start = (self.start_index() + cap - want) % cap;
        let read_seq = first_seq - want as u64;
        self.reader.seek(read_seq)?;
        let got = self.read_slots(new_start, want)?;
        if got != want {
            return Err(LogError::Truncated {
                seq: read_seq + got as u64,
            });
        }

        self.before += want;
        Ok(want)
    }

    /// Read up to `count` records into the slots starting at `first`,
    /// wrapping around the end of the array.
    fn read_slots(&mut self, first: usize, count: usize) -> Result<usize, LogError> {
        let cap = self.capacity();
        let first_len = count.min(cap - first);
        let mut got = self.reader.read(&mut self.buf[first..first + first_len])?;
        if got == first_len && count > first_len {
            got += self.reader.read(&mut self.buf[..count - first_len])?;
        }
        Ok(got)
    }
}
