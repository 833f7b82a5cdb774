//! Dynamic cast flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Independent options controlling what a cast does to its source.
///
/// All eight combinations are valid:
///
/// - `UNCONDITIONAL`: failure is fatal instead of returning `false`
/// - `TAKE_ON_SUCCESS`: on success the source is moved into the destination
/// - `DESTROY_ON_FAILURE`: on a conditional failure the source is destroyed
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DynamicCastFlags(u8);

impl DynamicCastFlags {
    /// Conditional cast that copies on success and leaves the source alone
    /// on failure.
    pub const NONE: Self = DynamicCastFlags(0);
    /// Failure terminates the process.
    pub const UNCONDITIONAL: Self = DynamicCastFlags(1 << 0);
    /// Success consumes the source.
    pub const TAKE_ON_SUCCESS: Self = DynamicCastFlags(1 << 1);
    /// Conditional failure consumes the source.
    pub const DESTROY_ON_FAILURE: Self = DynamicCastFlags(1 << 2);

    const ALL_BITS: u8 = 0b111;

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds flags from raw bits, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        DynamicCastFlags(bits & Self::ALL_BITS)
    }
}

impl BitOr for DynamicCastFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        DynamicCastFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DynamicCastFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DynamicCastFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::UNCONDITIONAL, "UNCONDITIONAL"),
            (Self::TAKE_ON_SUCCESS, "TAKE_ON_SUCCESS"),
            (Self::DESTROY_ON_FAILURE, "DESTROY_ON_FAILURE"),
        ];

        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if set.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&set.join(" | "))
        }
    }
}
