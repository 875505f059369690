// SPDX-License-Identifier: MIT

pub mod cli;
pub mod depth;
pub mod diff;
pub mod filter;
pub mod logfile;
pub mod logger;
pub mod names;
pub mod record;
pub mod ring;
pub mod utils;

/// One of the two logs taking part in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}
