// SPDX-License-Identifier: MIT

//! The fixed-width trace log record.
//!
//! A record is a single little-endian 32-bit word. The [`Tag`] occupies bits
//! 0..8 and the name index occupies bits 8..32:
//!
//! ```text
//!  31                               8 7            0
//! +----------------------------------+--------------+
//! |            name index            |      tag     |
//! +----------------------------------+--------------+
//! ```
//!
//! Records are stored back-to-back without padding. Other tools read this
//! format, so the layout must not change.

use std::path::PathBuf;

use thiserror::Error;

/// Size of one record in bytes.
pub const RECORD_SIZE: usize = 4;

/// Exclusive upper bound of a name index.
pub const NAME_INDEX_LIMIT: u32 = 1 << 24;

const TAG_MASK: u32 = 0xff;
const INDEX_SHIFT: u32 = 8;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown record tag {tag:#04x} at record {seq}")]
    UnknownTag { tag: u8, seq: u64 },
    #[error("{}: length {len} is not a multiple of the record size", path.display())]
    PartialRecord { path: PathBuf, len: u64 },
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("name index {0} does not fit in 24 bits")]
    IndexOverflow(u32),
    #[error("log ended unexpectedly before record {seq}")]
    Truncated { seq: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    Enter = 0,
    Leave = 1,
    Throw = 2,
    Catch = 3,
    Unwind = 4,
    Signal = 5,
    Unroll = 6,
    Reroll = 7,
}

const TAGS: [Tag; 8] = [
    Tag::Enter,
    Tag::Leave,
    Tag::Throw,
    Tag::Catch,
    Tag::Unwind,
    Tag::Signal,
    Tag::Unroll,
    Tag::Reroll,
];

const TAG_NAMES: [&str; 8] = [
    "ENTER", "LEAVE", "THROW", "CATCH", "UNWIND", "SIGNAL", "UNROLL", "REROLL",
];

const DEPTH_DELTAS: [i8; 8] = [1, -1, 0, 0, -1, 0, -1, 1];

impl Tag {
    pub fn all() -> &'static [Tag] {
        &TAGS
    }

    pub fn from_code(code: u8) -> Option<Tag> {
        TAGS.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        TAG_NAMES[self as usize]
    }

    /// Change in call depth caused by an event with this tag.
    pub fn depth_delta(self) -> i8 {
        DEPTH_DELTAS[self as usize]
    }

    /// Look up a tag by its exact, case-sensitive name.
    pub fn lookup(name: Option<&[u8]>) -> Option<Tag> {
        let name = name?;
        if name.is_empty() {
            return None;
        }
        TAG_NAMES
            .iter()
            .position(|candidate| candidate.len() == name.len() && candidate.as_bytes() == name)
            .map(|idx| TAGS[idx])
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl std::str::FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::lookup(Some(s.as_bytes())).ok_or_else(|| format!("unknown tag '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogRecord {
    pub tag: Tag,
    name_index: u32,
}

impl LogRecord {
    pub fn new(tag: Tag, name_index: u32) -> Result<Self, LogError> {
        if name_index >= NAME_INDEX_LIMIT {
            return Err(LogError::IndexOverflow(name_index));
        }
        Ok(Self { tag, name_index })
    }

    pub fn name_index(&self) -> u32 {
        self.name_index
    }

    pub fn encode(&self) -> u32 {
        (self.name_index << INDEX_SHIFT) | self.tag.code() as u32
    }

    /// Decode a record word. `seq` is only used for error reporting.
    pub fn decode(word: u32, seq: u64) -> Result<Self, LogError> {
        let code = (word & TAG_MASK) as u8;
        let tag = Tag::from_code(code).ok_or(LogError::UnknownTag { tag: code, seq })?;
        Ok(Self {
            tag,
            name_index: word >> INDEX_SHIFT,
        })
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        self.encode().to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8], seq: u64) -> Result<Self, LogError> {
        let mut raw = [0u8; RECORD_SIZE];
        raw.copy_from_slice(&bytes[..RECORD_SIZE]);
        Self::decode(u32::from_le_bytes(raw), seq)
    }
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            tag: Tag::Enter,
            name_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout() {
        let record = LogRecord::new(Tag::Catch, 0x123456).unwrap();
        assert_eq!(record.encode(), 0x1234_5603);
        assert_eq!(record.to_bytes(), [0x03, 0x56, 0x34, 0x12]);

        let decoded = LogRecord::from_bytes(&[0x07, 0xff, 0xff, 0xff], 0).unwrap();
        assert_eq!(decoded.tag, Tag::Reroll);
        assert_eq!(decoded.name_index(), NAME_INDEX_LIMIT - 1);
    }

    #[test]
    fn rejects_wide_index() {
        assert!(matches!(
            LogRecord::new(Tag::Enter, NAME_INDEX_LIMIT),
            Err(LogError::IndexOverflow(_))
        ));
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = LogRecord::decode(0x0000_0108, 17).unwrap_err();
        assert!(matches!(err, LogError::UnknownTag { tag: 8, seq: 17 }));
    }

    fn lookup(name: &[u8]) -> Option<Tag> {
        Tag::lookup(Some(name))
    }

    #[test]
    fn tag_lookup() {
        for &tag in Tag::all() {
            assert_eq!(Tag::lookup(Some(tag.name().as_bytes())), Some(tag));
        }

        assert_eq!(Tag::lookup(None), None);
        assert_eq!(lookup(b""), None);
        assert_eq!(lookup(b"ENTE"), None);
        assert_eq!(lookup(b"ENTERS"), None);
        assert_eq!(lookup(b"UNWIN"), None);
        assert_eq!(lookup(b"UNWINDS"), None);
        assert_eq!(lookup(b"Enter"), None);
        assert_eq!(lookup(b"enter"), None);
        assert_eq!(lookup(b"REWIND"), None);
        assert_eq!(lookup(b"ENTER\0"), None);
    }

    #[test]
    fn depth_deltas() {
        assert_eq!(Tag::Enter.depth_delta(), 1);
        assert_eq!(Tag::Leave.depth_delta(), -1);
        assert_eq!(Tag::Throw.depth_delta(), 0);
        assert_eq!(Tag::Unroll.depth_delta(), -Tag::Reroll.depth_delta());
    }
}
