use crate::{FRAME_SHIFT, FRAME_SIZE, VirtualPage};
use core::fmt;
use core::ops::Add;

/// Virtual memory address (32-bit).
///
/// ### Semantics
/// - [`page`](Self::page) / [`page_offset`](Self::page_offset) split the
///   address into the containing 4 KiB virtual page and the in-page offset.
/// - Range arithmetic that may cross the 4 GiB boundary goes through
///   [`checked_add`](Self::checked_add).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The virtual page that contains this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::from_number(self.0 >> FRAME_SHIFT)
    }

    /// Byte offset inside the containing page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & (FRAME_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// `self + bytes`, or `None` if the result leaves the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u32) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Whether `self` lies in `[base, base + len)`.
    ///
    /// Computed without forming `base + len`, so ranges ending exactly at
    /// the top of the address space are handled.
    #[inline]
    #[must_use]
    pub const fn is_within(self, base: Self, len: u32) -> bool {
        self.0 >= base.0 && self.0 - base.0 < len
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
