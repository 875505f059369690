// SPDX-License-Identifier: MIT

//! Divide-and-conquer O(ND) diff.
//!
//! Coordinates: `x` indexes log A and `y` indexes log B. Diagonal `k` is the
//! set of points with `x - y == k`. Within one middle-snake search, points
//! are relative to the start corner of the subproblem.

use std::ops::{Index, IndexMut};

use super::*;

/// Furthest-reaching `x` per diagonal, for diagonals in `-half-1 ..= half+1`.
pub(super) struct Diagonals {
    v: Vec<i64>,
    offset: i64,
}

impl Diagonals {
    pub(super) fn new(half: usize) -> Self {
        Self {
            v: vec![0; 2 * half + 3],
            offset: half as i64 + 1,
        }
    }

    fn slot(&self, k: i64) -> usize {
        let slot = k + self.offset;
        assert!(slot >= 0 && (slot as usize) < self.v.len(), "diagonal {} out of range", k);
        slot as usize
    }
}

impl Index<i64> for Diagonals {
    type Output = i64;

    fn index(&self, k: i64) -> &i64 {
        &self.v[self.slot(k)]
    }
}

impl IndexMut<i64> for Diagonals {
    fn index_mut(&mut self, k: i64) -> &mut i64 {
        let slot = self.slot(k);
        &mut self.v[slot]
    }
}

/// A diagonal run of matching records from `(x, y)` to `(u, v)`, found on an
/// edit path of length `d` between the corners of a subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct MiddleSnake {
    pub x: u64,
    pub y: u64,
    pub u: u64,
    pub v: u64,
    pub d: u64,
}

fn read_next(ring: &mut RingBuffer, prefetch: usize, seq: u64) -> Result<LogRecord> {
    Ok(*ring.next(prefetch)?.ok_or(LogError::Truncated { seq })?)
}

fn read_prev(ring: &mut RingBuffer, prefetch: usize, seq: u64) -> Result<LogRecord> {
    Ok(*ring.prev(prefetch)?.ok_or(LogError::Truncated { seq })?)
}

impl DiffContext {
    /// Length of the common run starting at `(x, y)` and bounded by `(xe, ye)`.
    fn match_forward(&mut self, x: u64, y: u64, xe: u64, ye: u64) -> Result<u64> {
        let prefetch = self.config.prefetch;
        let [fa, fb] = &mut self.forward;
        fa.seek(x);
        fb.seek(y);

        let mut n = 0;
        while x + n < xe && y + n < ye {
            let a = read_next(fa, prefetch, x + n)?;
            let b = read_next(fb, prefetch, y + n)?;
            if a != b {
                break;
            }
            n += 1;
        }
        Ok(n)
    }

    /// Length of the common run ending at `(x, y)` and bounded by `(xs, ys)`.
    fn match_backward(&mut self, xs: u64, ys: u64, x: u64, y: u64) -> Result<u64> {
        let prefetch = self.config.prefetch;
        let [ba, bb] = &mut self.backward;
        ba.seek(x);
        bb.seek(y);

        let mut n = 0;
        while x - n > xs && y - n > ys {
            let a = read_prev(ba, prefetch, x - n - 1)?;
            let b = read_prev(bb, prefetch, y - n - 1)?;
            if a != b {
                break;
            }
            n += 1;
        }
        Ok(n)
    }

    /// Emit the edit script turning `A[xs..xe]` into `B[ys..ye]`.
    pub(super) fn compare(
        &mut self,
        xs: u64,
        ys: u64,
        xe: u64,
        ye: u64,
        handler: &mut dyn DiffHandler,
    ) -> Result<()> {
        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);

        let prefix = self.match_forward(xs, ys, xe, ye)?;
        self.emit(DiffEvent::Common { a: xs, b: ys, len: prefix }, handler)?;
        let (xs, ys) = (xs + prefix, ys + prefix);

        let suffix = self.match_backward(xs, ys, xe, ye)?;
        let (xe, ye) = (xe - suffix, ye - suffix);

        if xs == xe {
            self.emit(DiffEvent::OnlyIn { side: Side::B, start: ys, len: ye - ys }, handler)?;
        } else if ys == ye {
            self.emit(DiffEvent::OnlyIn { side: Side::A, start: xs, len: xe - xs }, handler)?;
        } else {
            let snake = self.find_middle_snake(xs, ys, xe, ye)?;
            self.stats.max_snake_d = self.stats.max_snake_d.max(snake.d);

            #[cfg(feature = "debug-diff")]
            eprintln!(
                "{:indent$}({}, {})..({}, {}): snake ({}, {})..({}, {}) at d = {}",
                "",
                xs, ys, xe, ye,
                snake.x, snake.y, snake.u, snake.v, snake.d,
                indent = self.depth * 2
            );

            self.compare(xs, ys, snake.x, snake.y, handler)?;
            let middle = DiffEvent::Common { a: snake.x, b: snake.y, len: snake.u - snake.x };
            self.emit(middle, handler)?;
            self.compare(snake.u, snake.v, xe, ye, handler)?;
        }

        self.emit(DiffEvent::Common { a: xe, b: ye, len: suffix }, handler)?;
        self.depth -= 1;
        Ok(())
    }

    /// Find the middle snake of a shortest edit path from `(xs, ys)` to
    /// `(xe, ye)`, searching forward from the start and backward from the end
    /// in lockstep until the two searches overlap.
    ///
    /// Both ranges must be non-empty and must not share a common prefix or
    /// suffix, so the edit distance is at least 2.
    pub(super) fn find_middle_snake(
        &mut self,
        xs: u64,
        ys: u64,
        xe: u64,
        ye: u64,
    ) -> Result<MiddleSnake> {
        self.stats.middle_snakes += 1;

        let n = (xe - xs) as i64;
        let m = (ye - ys) as i64;
        let delta = n - m;
        let odd = delta & 1 != 0;
        let (dmin, dmax) = (-m, n);
        let max_d = self.config.max_d as i64;

        // The backward diagonals are stored shifted by `delta` so that both
        // arrays are centered on their starting diagonal.
        self.fdiag[0] = 0;
        self.bdiag[0] = n;
        let (mut fmin, mut fmax) = (0, 0);
        let (mut bmin, mut bmax) = (delta, delta);

        for c in 1i64.. {
            if 2 * c - 1 > max_d {
                Err(DiffError::TooDifferent { max_d: self.config.max_d })?;
            }

            // Forward search: paths of length c from the start corner.
            if fmin > dmin {
                fmin -= 1;
                self.fdiag[fmin - 1] = -1;
            } else {
                fmin += 1;
            }
            if fmax < dmax {
                fmax += 1;
                self.fdiag[fmax + 1] = -1;
            } else {
                fmax -= 1;
            }

            let mut k = fmax;
            while k >= fmin {
                // Take the move that reaches further along k. If both
                // neighbours hold the same x, the horizontal move is one step
                // further, so it wins the tie. A move that would leave the
                // box is clamped to its edge.
                let lo = self.fdiag[k - 1];
                let hi = self.fdiag[k + 1];
                let x0 = (lo + 1).min(n).max(hi.min(m + k));
                let y0 = x0 - k;
                assert!(0 <= x0 && x0 <= n && 0 <= y0 && y0 <= m);

                let run = self.match_forward(xs + x0 as u64, ys + y0 as u64, xe, ye)? as i64;
                let x = x0 + run;
                self.fdiag[k] = x;

                if odd && bmin <= k && k <= bmax && self.bdiag[k - delta] <= x {
                    return Ok(MiddleSnake {
                        x: xs + x0 as u64,
                        y: ys + y0 as u64,
                        u: xs + x as u64,
                        v: ys + (x - k) as u64,
                        d: (2 * c - 1) as u64,
                    });
                }
                k -= 2;
            }

            if 2 * c > max_d {
                Err(DiffError::TooDifferent { max_d: self.config.max_d })?;
            }

            // Backward search: paths of length c from the end corner.
            if bmin > dmin {
                bmin -= 1;
                self.bdiag[bmin - 1 - delta] = i64::MAX;
            } else {
                bmin += 1;
            }
            if bmax < dmax {
                bmax += 1;
                self.bdiag[bmax + 1 - delta] = i64::MAX;
            } else {
                bmax -= 1;
            }

            let mut k = bmax;
            while k >= bmin {
                // Mirror of the forward step, clamped the same way.
                let lo = self.bdiag[k - 1 - delta];
                let hi = self.bdiag[k + 1 - delta];
                let x0 = lo.max(k).min((hi - 1).max(0));
                let y0 = x0 - k;
                assert!(0 <= x0 && x0 <= n && 0 <= y0 && y0 <= m);

                let run = self.match_backward(xs, ys, xs + x0 as u64, ys + y0 as u64)? as i64;
                let x = x0 - run;
                self.bdiag[k - delta] = x;

                if !odd && fmin <= k && k <= fmax && x <= self.fdiag[k] {
                    return Ok(MiddleSnake {
                        x: xs + x as u64,
                        y: ys + (x - k) as u64,
                        u: xs + x0 as u64,
                        v: ys + y0 as u64,
                        d: (2 * c) as u64,
                    });
                }
                k -= 2;
            }

            if let SearchPolicy::Heuristic { threshold } = self.config.search {
                if c >= threshold as i64 {
                    if let Some((x, y)) = self.best_split(n, m, delta, (fmin, fmax), (bmin, bmax)) {
                        self.stats.heuristic_splits += 1;
                        let (x, y) = (xs + x as u64, ys + y as u64);
                        return Ok(MiddleSnake { x, y, u: x, v: y, d: (2 * c) as u64 });
                    }
                }
            }
        }
        unreachable!()
    }

    /// Pick the point reached so far that lies furthest along its search
    /// direction, preferring the direction that made more progress. Returns
    /// `None` if that point is a corner, since splitting there would not
    /// shrink the problem.
    fn best_split(
        &self,
        n: i64,
        m: i64,
        delta: i64,
        (fmin, fmax): (i64, i64),
        (bmin, bmax): (i64, i64),
    ) -> Option<(i64, i64)> {
        let mut fbest = (-1, 0);
        let mut k = fmax;
        while k >= fmin {
            let mut x = self.fdiag[k].min(n);
            let mut y = x - k;
            if y > m {
                x = m + k;
                y = m;
            }
            if x + y > fbest.0 {
                fbest = (x + y, x);
            }
            k -= 2;
        }

        let mut bbest = (i64::MAX, 0);
        let mut k = bmax;
        while k >= bmin {
            let mut x = self.bdiag[k - delta].max(0);
            let mut y = x - k;
            if y < 0 {
                x = k;
                y = 0;
            }
            if x + y < bbest.0 {
                bbest = (x + y, x);
            }
            k -= 2;
        }

        let (x, y) = if (n + m) - bbest.0 < fbest.0 {
            (fbest.1, fbest.0 - fbest.1)
        } else {
            (bbest.1, bbest.0 - bbest.1)
        };
        if (x, y) == (0, 0) || (x, y) == (n, m) {
            None
        } else {
            Some((x, y))
        }
    }
}
