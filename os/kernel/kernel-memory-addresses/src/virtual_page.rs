use crate::{FRAME_SHIFT, VirtualAddress};
use core::fmt;

/// A 4 KiB virtual page, identified by its page number (`address >> 12`).
///
/// ### Invariants
/// - The page number is below `2^20`, so [`base`](Self::base) always fits
///   into a 32-bit address.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    /// Number of 4 KiB pages in a 32-bit address space.
    pub const COUNT: u32 = 1 << (32 - FRAME_SHIFT);

    /// Page containing `va` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        va.page()
    }

    /// Construct from a raw page number.
    ///
    /// ### Debug assertions
    /// - Asserts `n < 2^20` in debug builds.
    #[inline]
    #[must_use]
    pub const fn from_number(n: u32) -> Self {
        debug_assert!(n < Self::COUNT);
        Self(n)
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    /// First byte of the page.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << FRAME_SHIFT)
    }

    /// The page directly following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self::from_number(self.0 + 1)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.base().as_u32())
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}/4K", self.base().as_u32())
    }
}
