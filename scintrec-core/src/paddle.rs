//! Paddle and PMT side identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored in every derived slot that carries no value for the
/// current event.
pub const NO_DATA: f64 = f64::NAN;

/// PMT side of a paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Left PMT.
    Left = 0,
    /// Right PMT.
    Right = 1,
}

impl Side {
    /// Both sides, left first.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Index into two-element per-side tables.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// One-letter prefix used for exported variable names.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Left => "l",
            Side::Right => "r",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}
