use crate::{FRAME_SHIFT, PhysicalAddress};
use core::fmt;
use core::ops::Add;

/// Index of a 4 KiB physical frame.
///
/// Frame `n` covers the physical bytes `[n * FRAME_SIZE, (n + 1) * FRAME_SIZE)`.
/// On a 32-bit machine the valid range is `0..2^20`.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let f = FrameNumber::new(1024);
/// assert_eq!(f.base_address(), PhysicalAddress::new(0x0040_0000));
/// assert_eq!((f + 3).as_u32(), 1027);
/// assert_eq!((f + 3).distance_from(f), 3);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
    /// Highest representable frame number on a 32-bit physical bus.
    pub const MAX: Self = Self(u32::MAX >> FRAME_SHIFT);

    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Physical address of the first byte of this frame.
    ///
    /// This is the only place frame numbers are turned into addresses.
    #[inline]
    #[must_use]
    pub const fn base_address(self) -> PhysicalAddress {
        debug_assert!(self.0 <= Self::MAX.0, "frame number beyond 32-bit physical space");
        PhysicalAddress::new(self.0 << FRAME_SHIFT)
    }

    /// `self + n`, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, n: u32) -> Option<Self> {
        match self.0.checked_add(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Number of frames from `base` up to (excluding) `self`.
    ///
    /// ### Debug assertions
    /// - Asserts `self >= base`.
    #[inline]
    #[must_use]
    pub const fn distance_from(self, base: Self) -> u32 {
        debug_assert!(self.0 >= base.0);
        self.0 - base.0
    }
}

impl Add<u32> for FrameNumber {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<u32> for FrameNumber {
    #[inline]
    fn from(n: u32) -> Self {
        Self::new(n)
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(#{})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
