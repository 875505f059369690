// SPDX-License-Identifier: MIT

//! File I/O for trace logs: an append-only writer, a sequential reader with
//! a cheap seek, and a memory-mapped random-access reader.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::warn;

pub use crate::record::LogError;
use crate::record::{LogRecord, RECORD_SIZE};

fn check_len(path: &Path, len: u64) -> Result<u64, LogError> {
    if len % RECORD_SIZE as u64 != 0 {
        return Err(LogError::PartialRecord {
            path: path.to_path_buf(),
            len,
        });
    }
    Ok(len / RECORD_SIZE as u64)
}

/// Number of records in the log at `path`.
pub fn record_count(path: &Path) -> Result<u64, LogError> {
    let len = std::fs::metadata(path)?.len();
    check_len(path, len)
}

/// Append-only log writer.
///
/// Every [`append`](LogWriter::append) is issued as a single write. A write
/// that comes up short is an error and is not retried.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    len: u64,
    scratch: Vec<u8>,
}

impl LogWriter {
    pub fn create(path: &Path) -> Result<Self, LogError> {
        let file = File::create(path)?;
        Ok(Self {
            file,
            len: 0,
            scratch: Vec::new(),
        })
    }

    /// Open an existing log for appending, creating it if necessary.
    pub fn open_append(path: &Path) -> Result<Self, LogError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = check_len(path, file.metadata()?.len())?;
        Ok(Self {
            file,
            len,
            scratch: Vec::new(),
        })
    }

    pub fn append(&mut self, records: &[LogRecord]) -> Result<(), LogError> {
        if records.is_empty() {
            return Ok(());
        }

        self.scratch.clear();
        self.scratch.reserve(records.len() * RECORD_SIZE);
        for record in records {
            self.scratch.extend_from_slice(&record.to_bytes());
        }

        let written = self.file.write(&self.scratch)?;
        if written != self.scratch.len() {
            return Err(LogError::ShortWrite {
                written,
                expected: self.scratch.len(),
            });
        }

        self.len += records.len() as u64;
        Ok(())
    }

    /// Number of records in the log, including previously existing ones.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flush the log to stable storage and return its length in records.
    pub fn finish(self) -> Result<u64, LogError> {
        self.file.sync_all()?;
        Ok(self.len)
    }
}

/// Sequential log reader.
#[derive(Debug)]
pub struct LogReader {
    file: File,
    path: PathBuf,
    offset: u64, // byte offset of the OS file cursor
    scratch: Vec<u8>,
}

impl LogReader {
    pub fn open(path: &Path) -> Result<Self, LogError> {
        Ok(Self {
            file: File::open(path)?,
            path: path.to_path_buf(),
            offset: 0,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number of the next record that [`read`](LogReader::read) returns.
    pub fn position(&self) -> u64 {
        self.offset / RECORD_SIZE as u64
    }

    pub fn seek(&mut self, seq: u64) -> Result<(), LogError> {
        let target = seq * RECORD_SIZE as u64;
        if target == self.offset {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(target))?;
        self.offset = target;
        Ok(())
    }

    /// Read up to `out.len()` records. Returns the number of records read,
    /// which is smaller than requested only at the end of the file.
    pub fn read(&mut self, out: &mut [LogRecord]) -> Result<usize, LogError> {
        let want = out.len() * RECORD_SIZE;
        self.scratch.resize(want, 0);

        let mut got = 0;
        while got < want {
            match self.file.read(&mut self.scratch[got..want]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let first = self.position();
        let whole = got / RECORD_SIZE;
        if got % RECORD_SIZE != 0 {
            warn!(
                "{}: short read, log ends in a partial record after record {}",
                self.path.display(),
                first + whole as u64
            );
            self.file
                .seek(SeekFrom::Start(self.offset + (whole * RECORD_SIZE) as u64))?;
        }

        self.offset += (whole * RECORD_SIZE) as u64;

        for (idx, slot) in out[..whole].iter_mut().enumerate() {
            let bytes = &self.scratch[idx * RECORD_SIZE..(idx + 1) * RECORD_SIZE];
            *slot = LogRecord::from_bytes(bytes, first + idx as u64)?;
        }

        Ok(whole)
    }
}

/// Read-only, memory-mapped view of a whole log.
#[derive(Debug)]
pub struct MappedLog {
    map: Option<Mmap>,
    len: u64,
    path: PathBuf,
}

impl MappedLog {
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let file = File::open(path)?;
        let byte_len = file.metadata()?.len();
        let len = check_len(path, byte_len)?;

        // Empty files cannot be mapped on every platform.
        let map = if byte_len == 0 {
            None
        } else {
            // SAFETY: logs are only ever read once they are closed; nobody
            // truncates a file while it is mapped.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            map,
            len,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, seq: u64) -> Result<LogRecord, LogError> {
        let map = match &self.map {
            Some(map) if seq < self.len => map,
            _ => return Err(LogError::Truncated { seq }),
        };
        let offset = seq as usize * RECORD_SIZE;
        LogRecord::from_bytes(&map[offset..offset + RECORD_SIZE], seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<LogRecord, LogError>> + '_ {
        (0..self.len).map(move |seq| self.get(seq))
    }
}
