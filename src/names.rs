// SPDX-License-Identifier: MIT

//! The string table that record name indices refer to.
//!
//! A table with prefix `P` consists of two files: `P.index`, a packed array of
//! `{offset: i64, length: i32}` little-endian entries, and `P.strings`, the
//! concatenated name bytes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::record::NAME_INDEX_LIMIT;
use crate::utils::*;

pub const INDEX_ENTRY_SIZE: usize = 12;

pub fn index_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".index")
}

pub fn strings_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".strings")
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn map_file(path: &Path) -> Result<Option<Mmap>> {
    with_path(path, || {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        // SAFETY: name tables are append-only and never truncated while a
        // reader has them open.
        Ok(Some(unsafe { Mmap::map(&file)? }))
    })
}

/// Read-only view of a name table.
pub struct NameTable {
    index: Option<Mmap>,
    strings: Option<Mmap>,
    len: u32,
}

impl NameTable {
    pub fn open(prefix: &Path) -> Result<Self> {
        let index = map_file(&index_path(prefix))?;
        let strings = map_file(&strings_path(prefix))?;

        let index_len = index.as_ref().map_or(0, |map| map.len());
        if index_len % INDEX_ENTRY_SIZE != 0 {
            return Err(format!(
                "{}: truncated index entry",
                index_path(prefix).display()
            ))?;
        }

        Ok(Self {
            index,
            strings,
            len: (index_len / INDEX_ENTRY_SIZE) as u32,
        })
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the name with the given index, or `None` if the index is unknown
    /// or its entry points outside of the strings file.
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        if index >= self.len {
            return None;
        }
        let entry_offset = index as usize * INDEX_ENTRY_SIZE;
        let entry = &self.index.as_ref()?[entry_offset..entry_offset + INDEX_ENTRY_SIZE];
        let offset = usize::try_from(read_i64_le(&entry[..8])).ok()?;
        let length = usize::try_from(read_i32_le(&entry[8..])).ok()?;

        match &self.strings {
            Some(strings) => strings.get(offset..offset.checked_add(length)?),
            None if length == 0 => Some(&[][..]),
            None => None,
        }
    }

    pub fn display(&self, index: u32) -> Cow<'_, str> {
        match self.get(index) {
            Some(name) => String::from_utf8_lossy(name),
            None => Cow::Owned(format!("#{}", index)),
        }
    }
}

/// Writer side of a name table.
///
/// Indices are handed out in order of first appearance and never change.
pub struct NameTableBuilder {
    index: BufWriter<File>,
    strings: BufWriter<File>,
    lookup: HashMap<Vec<u8>, u32>,
    strings_len: i64,
}

impl NameTableBuilder {
    pub fn create(prefix: &Path) -> Result<Self> {
        let index_path = index_path(prefix);
        let strings_path = strings_path(prefix);
        let index = with_path(&index_path, || Ok(File::create(&index_path)?))?;
        let strings = with_path(&strings_path, || Ok(File::create(&strings_path)?))?;

        Ok(Self {
            index: BufWriter::new(index),
            strings: BufWriter::new(strings),
            lookup: HashMap::new(),
            strings_len: 0,
        })
    }

    pub fn len(&self) -> u32 {
        self.lookup.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn intern(&mut self, name: &[u8]) -> Result<u32> {
        if let Some(&index) = self.lookup.get(name) {
            return Ok(index);
        }

        let index = self.lookup.len() as u32;
        if index >= NAME_INDEX_LIMIT {
            return Err("name table is full")?;
        }
        let length = i32::try_from(name.len()).map_err(|_| err_from_str("name too long"))?;

        self.index.write_all(&self.strings_len.to_le_bytes())?;
        self.index.write_all(&length.to_le_bytes())?;
        self.strings.write_all(name)?;
        self.strings_len += length as i64;

        self.lookup.insert(name.to_vec(), index);
        Ok(index)
    }

    pub fn finish(self) -> Result<()> {
        for writer in [self.index, self.strings] {
            let file = writer.into_inner().map_err(|err| err.into_error())?;
            file.sync_all()?;
        }
        Ok(())
    }
}
