// SPDX-License-Identifier: MIT

//! Append-side trace logger.
//!
//! [`TraceLogger`] is not synchronized. A multi-threaded host
//! wraps it in a single mutex so that "look up or allocate a name index, then
//! append" happens as one critical section.

use std::path::Path;

use crate::logfile::LogWriter;
use crate::names::NameTableBuilder;
use crate::record::{LogRecord, Tag};
use crate::utils::*;

const FLUSH_THRESHOLD: usize = 1024;

pub struct TraceLogger {
    names: NameTableBuilder,
    log: LogWriter,
    pending: Vec<LogRecord>,
}

impl TraceLogger {
    pub fn create(name_prefix: &Path, log_path: &Path) -> Result<Self> {
        let names = NameTableBuilder::create(name_prefix)?;
        let log = with_path(log_path, || Ok(LogWriter::create(log_path)?))?;
        Ok(Self {
            names,
            log,
            pending: Vec::with_capacity(FLUSH_THRESHOLD),
        })
    }

    pub fn record(&mut self, tag: Tag, name: &[u8]) -> Result<()> {
        let index = self.names.intern(name)?;
        self.pending.push(LogRecord::new(tag, index)?);
        if self.pending.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    pub fn enter(&mut self, name: &[u8]) -> Result<()> {
        self.record(Tag::Enter, name)
    }

    pub fn leave(&mut self, name: &[u8]) -> Result<()> {
        self.record(Tag::Leave, name)
    }

    /// Total number of records logged so far, including buffered ones.
    pub fn len(&self) -> u64 {
        self.log.len() + self.pending.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&mut self) -> Result<()> {
        self.log.append(&self.pending)?;
        self.pending.clear();
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        self.names.finish()?;
        Ok(self.log.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::MappedLog;
    use crate::names::NameTable;

    #[test]
    fn logs_calls() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("names");
        let path = dir.path().join("run.log");

        let mut logger = TraceLogger::create(&prefix, &path).unwrap();
        logger.enter(b"main").unwrap();
        logger.enter(b"helper").unwrap();
        logger.record(Tag::Throw, b"helper").unwrap();
        logger.record(Tag::Unwind, b"helper").unwrap();
        logger.record(Tag::Catch, b"main").unwrap();
        logger.leave(b"main").unwrap();
        assert_eq!(logger.len(), 6);
        assert_eq!(logger.finish().unwrap(), 6);

        let names = NameTable::open(&prefix).unwrap();
        let log = MappedLog::open(&path).unwrap();
        let rendered: Vec<String> = log
            .iter()
            .map(|record| {
                let record = record.unwrap();
                format!("{} {}", record.tag, names.display(record.name_index()))
            })
            .collect();
        assert_eq!(
            rendered,
            [
                "ENTER main",
                "ENTER helper",
                "THROW helper",
                "UNWIND helper",
                "CATCH main",
                "LEAVE main"
            ]
        );
    }
}
