// SPDX-License-Identifier: MIT

use std::io::Write;
use std::path::Path;

use lazy_static::lazy_static;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::filter::{RemovedRange, RemovedRangeReader};
use crate::logfile::MappedLog;
use crate::names::NameTable;
use crate::record::LogRecord;
use crate::utils::*;
use crate::Side;

use super::{DiffHandler, DisplayCursors};

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Number of common records shown on each side of a change.
    pub context: usize,
}
impl Default for RenderOptions {
    fn default() -> Self {
        Self { context: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Common,
    OnlyIn(Side),
    Unmatchable(Side),
}
impl LineStatus {
    fn marker(self) -> &'static [u8] {
        match self {
            LineStatus::Common => b" ",
            LineStatus::OnlyIn(Side::A) => b"-",
            LineStatus::OnlyIn(Side::B) => b"+",
            LineStatus::Unmatchable(Side::A) => b"<",
            LineStatus::Unmatchable(Side::B) => b">",
        }
    }

    fn color(self) -> &'static ColorSpec {
        match self {
            LineStatus::Common => &COLORS.default,
            LineStatus::OnlyIn(Side::A) => &COLORS.only_a,
            LineStatus::OnlyIn(Side::B) => &COLORS.only_b,
            LineStatus::Unmatchable(Side::A) => &COLORS.unmatchable_a,
            LineStatus::Unmatchable(Side::B) => &COLORS.unmatchable_b,
        }
    }
}

#[derive(Default)]
struct Colors {
    default: ColorSpec,
    skip: ColorSpec,
    only_a: ColorSpec,
    only_b: ColorSpec,
    unmatchable_a: ColorSpec,
    unmatchable_b: ColorSpec,
}
impl Colors {
    fn new() -> Self {
        let mut colors = Colors {
            ..Default::default()
        };
        colors.skip.set_fg(Some(Color::Cyan));
        colors.only_a.set_fg(Some(Color::Red));
        colors.only_b.set_fg(Some(Color::Green));
        colors.unmatchable_a.set_fg(Some(Color::Red)).set_dimmed(true);
        colors.unmatchable_b.set_fg(Some(Color::Green)).set_dimmed(true);
        colors
    }
}
lazy_static! {
    static ref COLORS: Colors = Colors::new();
}

/// Position in the original log of a side, tracked alongside the cleaned log
/// the diff engine walks.
struct SideState {
    removed: RemovedRangeReader,
    /// Total length of the removed ranges rendered so far.
    skipped: u64,
}

impl SideState {
    /// The next removed range if it belongs directly before cleaned position
    /// `pos`.
    fn due_at(&mut self, pos: u64) -> Result<Option<RemovedRange>> {
        match self.removed.peek()? {
            Some(range) => {
                let original = pos + self.skipped;
                if range.start < original {
                    Err(format!(
                        "removed range at {} lies before original position {}",
                        range.start, original
                    ))?;
                }
                Ok((range.start == original).then_some(range))
            }
            None => Ok(None),
        }
    }

    /// Number of cleaned records that can be walked from `pos` before the
    /// next removed range is due.
    fn room_at(&mut self, pos: u64) -> Result<u64> {
        Ok(match self.removed.peek()? {
            Some(range) => range.start.saturating_sub(pos + self.skipped),
            None => u64::MAX,
        })
    }
}

/// A [`DiffHandler`] that prints the edit script in a unified-diff-like form.
pub struct Renderer<'a> {
    out: &'a mut dyn WriteColor,
    names: &'a NameTable,
    originals: [&'a MappedLog; 2],
    sides: [SideState; 2],
    context: u64,
    /// Common records not yet printed, given as the positions in A and B of
    /// the first one and their count.
    held: Option<(u64, u64, u64)>,
    after_change: bool,
}

impl<'a> Renderer<'a> {
    /// `originals` are the unfiltered logs and `removed` the side files that
    /// describe what was filtered out of them.
    pub fn new(
        out: &'a mut dyn WriteColor,
        names: &'a NameTable,
        originals: [&'a MappedLog; 2],
        removed: [&Path; 2],
        options: &RenderOptions,
    ) -> Result<Self> {
        let side = |path: &Path| -> Result<SideState> {
            Ok(SideState {
                removed: RemovedRangeReader::open(path)?,
                skipped: 0,
            })
        };
        Ok(Self {
            out,
            names,
            originals,
            sides: [side(removed[0])?, side(removed[1])?],
            context: options.context as u64,
            held: None,
            after_change: false,
        })
    }

    fn write_line(&mut self, status: LineStatus, record: &LogRecord) -> Result<()> {
        let color = status.color();
        if color != &COLORS.default {
            self.out.set_color(color)?;
        }
        self.out.write_all(status.marker())?;
        let name = self.names.display(record.name_index());
        self.out.write_all(format!("{:<6} {}\n", record.tag, name).as_bytes())?;
        if color != &COLORS.default {
            self.out.reset()?;
        }
        Ok(())
    }

    fn write_skip(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.out.set_color(&COLORS.skip)?;
        self.out
            .write_all(format!("@@ {} common entries skipped @@\n", count).as_bytes())?;
        self.out.reset()?;
        Ok(())
    }

    fn write_common(&mut self, display: &mut DisplayCursors, a: u64, len: u64) -> Result<()> {
        for seq in a..a + len {
            let record = display.record(Side::A, seq)?;
            self.write_line(LineStatus::Common, &record)?;
        }
        Ok(())
    }

    /// Print what is left of the held common run ahead of a change.
    fn release_held(&mut self, display: &mut DisplayCursors) -> Result<()> {
        if let Some((a, _, len)) = self.held.take() {
            let shown = len.min(self.context);
            self.write_skip(len - shown)?;
            self.write_common(display, a + len - shown, shown)?;
        }
        Ok(())
    }

    fn start_change(&mut self, display: &mut DisplayCursors) -> Result<()> {
        self.release_held(display)?;
        self.after_change = true;
        Ok(())
    }

    fn common_chunk(
        &mut self,
        display: &mut DisplayCursors,
        a: u64,
        b: u64,
        len: u64,
    ) -> Result<()> {
        let (mut a, mut b, mut len) = (a, b, len);
        if let Some((held_a, held_b, held_len)) = self.held {
            assert_eq!((held_a + held_len, held_b + held_len), (a, b));
            self.held = Some((held_a, held_b, held_len + len));
            return Ok(());
        }

        if self.after_change {
            let lead = len.min(self.context);
            self.write_common(display, a, lead)?;
            a += lead;
            b += lead;
            len -= lead;
            self.after_change = false;
        }
        if len > 0 {
            self.held = Some((a, b, len));
        }
        Ok(())
    }

    /// Render every removed range of `side` that belongs directly before
    /// cleaned position `pos`.
    fn removed_at(&mut self, side: Side, pos: u64) -> Result<()> {
        while let Some(range) = self.sides[side.index()].due_at(pos)? {
            self.write_removed(side, range)?;
        }
        Ok(())
    }

    fn write_removed(&mut self, side: Side, range: RemovedRange) -> Result<()> {
        let original = self.originals[side.index()];
        let state = &mut self.sides[side.index()];
        state.removed.next()?;
        state.skipped += range.len;

        for seq in range.start..range.end() {
            let record = with_path(original.path(), || Ok(original.get(seq)?))?;
            self.write_line(LineStatus::Unmatchable(side), &record)?;
        }
        Ok(())
    }

    fn walk(
        &mut self,
        display: &mut DisplayCursors,
        pos: [Option<u64>; 2],
        len: u64,
        mut chunk: impl FnMut(&mut Self, &mut DisplayCursors, [u64; 2], u64) -> Result<()>,
    ) -> Result<()> {
        let mut pos = pos;
        let mut left = len;
        while left > 0 {
            let mut room = left;
            for side in Side::BOTH {
                if let Some(p) = pos[side.index()] {
                    if self.sides[side.index()].due_at(p)?.is_some() {
                        self.start_change(display)?;
                        self.removed_at(side, p)?;
                    }
                    room = room.min(self.sides[side.index()].room_at(p)?);
                }
            }
            assert!(room > 0);

            let at = [pos[0].unwrap_or(0), pos[1].unwrap_or(0)];
            chunk(self, display, at, room)?;
            for p in pos.iter_mut().flatten() {
                *p += room;
            }
            left -= room;
        }
        Ok(())
    }
}

impl<'a> DiffHandler for Renderer<'a> {
    fn handle_common(
        &mut self,
        display: &mut DisplayCursors,
        a: u64,
        b: u64,
        len: u64,
    ) -> Result<()> {
        self.walk(display, [Some(a), Some(b)], len, |this, display, [a, b], len| {
            this.common_chunk(display, a, b, len)
        })
    }

    fn handle_only_in(
        &mut self,
        display: &mut DisplayCursors,
        side: Side,
        start: u64,
        len: u64,
    ) -> Result<()> {
        let mut pos = [None, None];
        pos[side.index()] = Some(start);
        self.walk(display, pos, len, |this, display, at, len| {
            this.start_change(display)?;
            let start = at[side.index()];
            for seq in start..start + len {
                let record = display.record(side, seq)?;
                this.write_line(LineStatus::OnlyIn(side), &record)?;
            }
            Ok(())
        })
    }

    fn finish(&mut self, display: &mut DisplayCursors) -> Result<()> {
        // Removed ranges at the very end of a log follow the last cleaned
        // record.
        for side in Side::BOTH {
            let state = &mut self.sides[side.index()];
            if state.removed.peek()?.is_some() {
                self.start_change(display)?;
                while let Some(range) = self.sides[side.index()].removed.peek()? {
                    self.write_removed(side, range)?;
                }
            }
        }

        if let Some((_, _, len)) = self.held.take() {
            self.write_skip(len)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
