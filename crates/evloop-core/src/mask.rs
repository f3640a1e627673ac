//! Interest and event mask bits for channels.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Bit set describing what a channel wants to be told about (interest) or
/// what just happened to it (event). One type serves both uses, the same
/// way the masks travel between registration and dispatch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FdMask(u8);

impl FdMask {
    pub const NONE: FdMask = FdMask(0);
    pub const READ: FdMask = FdMask(1 << 0);
    pub const WRITE: FdMask = FdMask(1 << 1);
    pub const ERROR: FdMask = FdMask(1 << 2);
    pub const CLOSE: FdMask = FdMask(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> FdMask {
        FdMask(bits & 0b1111)
    }

    /// True when every bit of `other` is present in `self`.
    pub const fn contains(self, other: FdMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one bit.
    pub const fn intersects(self, other: FdMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FdMask {
    type Output = FdMask;
    fn bitor(self, rhs: FdMask) -> FdMask {
        FdMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for FdMask {
    fn bitor_assign(&mut self, rhs: FdMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FdMask {
    type Output = FdMask;
    fn bitand(self, rhs: FdMask) -> FdMask {
        FdMask(self.0 & rhs.0)
    }
}

impl BitAndAssign for FdMask {
    fn bitand_assign(&mut self, rhs: FdMask) {
        self.0 &= rhs.0;
    }
}

impl Not for FdMask {
    type Output = FdMask;
    fn not(self) -> FdMask {
        FdMask::from_bits(!self.0)
    }
}

impl fmt::Debug for FdMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (bit, name) in [
            (FdMask::READ, "READ"),
            (FdMask::WRITE, "WRITE"),
            (FdMask::ERROR, "ERROR"),
            (FdMask::CLOSE, "CLOSE"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}
