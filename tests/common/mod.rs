// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use trace_diff::*;
use diff::{DiffConfig, DiffContext, DiffEvent, EventCollector, RenderOptions, Renderer};
use filter::{filter_unmatchable, FilterPaths};
use logfile::{LogWriter, MappedLog};
use names::{NameTable, NameTableBuilder};
use record::{LogRecord, Tag};
use utils::Result;

pub fn rec(index: u32) -> LogRecord {
    LogRecord::new(Tag::Enter, index).unwrap()
}

pub fn recs(indices: &[u32]) -> Vec<LogRecord> {
    indices.iter().copied().map(rec).collect()
}

pub fn write_log(path: &Path, records: &[LogRecord]) -> Result<()> {
    let mut writer = LogWriter::create(path)?;
    writer.append(records)?;
    writer.finish()?;
    Ok(())
}

/// Run the diff engine on two in-memory logs.
pub fn diff_records(
    dir: &Path,
    a: &[LogRecord],
    b: &[LogRecord],
    config: DiffConfig,
) -> Result<Vec<DiffEvent>> {
    let path_a = dir.join("a.log");
    let path_b = dir.join("b.log");
    write_log(&path_a, a)?;
    write_log(&path_b, b)?;
    diff_files(&path_a, &path_b, config)
}

/// Run the diff engine on two log files.
pub fn diff_files(a: &Path, b: &Path, config: DiffConfig) -> Result<Vec<DiffEvent>> {
    let mut context = DiffContext::open(a, b, config)?;
    let mut collector = EventCollector::new();
    context.run(&mut collector)?;
    Ok(collector.events)
}

/// Check that `events` is an edit script that turns `a` into `b`.
pub fn check_script(a: &[LogRecord], b: &[LogRecord], events: &[DiffEvent]) {
    let mut pos = [0u64, 0u64];
    let mut previous: Option<DiffEvent> = None;
    for event in events {
        assert!(!event.is_empty(), "empty event {:?}", event);
        match *event {
            DiffEvent::Common { a: start_a, b: start_b, len } => {
                assert_eq!([start_a, start_b], pos, "gap before {:?}", event);
                for i in 0..len {
                    assert_eq!(a[(start_a + i) as usize], b[(start_b + i) as usize]);
                }
                pos = [start_a + len, start_b + len];
                let coalesced = !matches!(previous, Some(DiffEvent::Common { .. }));
                assert!(coalesced, "uncoalesced {:?}", event);
            }
            DiffEvent::OnlyIn { side, start, len } => {
                assert_eq!(start, pos[side.index()], "gap before {:?}", event);
                pos[side.index()] += len;
                if let Some(DiffEvent::OnlyIn { side: previous_side, .. }) = previous {
                    assert_ne!(previous_side, side, "uncoalesced {:?}", event);
                }
            }
        }
        previous = Some(*event);
    }
    assert_eq!(pos, [a.len() as u64, b.len() as u64]);
}

/// Length of the longest common subsequence, by dynamic programming.
pub fn lcs_len(a: &[LogRecord], b: &[LogRecord]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diag = 0;
        for (j, y) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if x == y { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    row[b.len()]
}

/// Parse a textual trace, one `TAG name` per line, interning the names.
pub fn parse_trace(names: &mut NameTableBuilder, text: &str) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (tag, name) = line.split_once(' ').unwrap_or((line, ""));
        let tag: Tag = tag.parse()?;
        records.push(LogRecord::new(tag, names.intern(name.as_bytes())?)?);
    }
    Ok(records)
}

pub struct TraceFiles {
    pub prefix: PathBuf,
    pub logs: [PathBuf; 2],
}

/// Write two textual traces as logs sharing one name table.
pub fn write_traces(dir: &Path, a: &str, b: &str) -> Result<TraceFiles> {
    let prefix = dir.join("names");
    let logs = [dir.join("a.log"), dir.join("b.log")];

    let mut names = NameTableBuilder::create(&prefix)?;
    write_log(&logs[0], &parse_trace(&mut names, a)?)?;
    write_log(&logs[1], &parse_trace(&mut names, b)?)?;
    names.finish()?;

    Ok(TraceFiles { prefix, logs })
}

/// Filter, diff and render two logs the way `difftool` does, without color.
pub fn render(
    dir: &Path,
    files: &TraceFiles,
    config: DiffConfig,
    context: usize,
) -> Result<String> {
    let names = NameTable::open(&files.prefix)?;
    let scratch = dir.join("scratch");
    std::fs::create_dir_all(&scratch)?;
    let paths = FilterPaths::in_dir(&scratch);
    filter_unmatchable([files.logs[0].as_path(), files.logs[1].as_path()], &paths)?;

    let originals = [MappedLog::open(&files.logs[0])?, MappedLog::open(&files.logs[1])?];
    let mut diff = DiffContext::open(&paths.cleaned[0], &paths.cleaned[1], config)?;

    let mut out = termcolor::NoColor::new(Vec::new());
    {
        let mut renderer = Renderer::new(
            &mut out,
            &names,
            [&originals[0], &originals[1]],
            [&paths.removed[0], &paths.removed[1]],
            &RenderOptions { context },
        )?;
        diff.run(&mut renderer)?;
    }
    Ok(String::from_utf8(out.into_inner())?)
}
