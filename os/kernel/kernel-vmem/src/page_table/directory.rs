//! # Page Directory (top level)
//!
//! - [`DirectoryIndex`]: index type for VA bits `[31:22]`.
//! - [`PdEntry`]: a directory entry (PDE). Only the 4 KiB-table form is
//!   used; `PS` is always 0.
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PDEs.
//!
//! Frames handed out by the pools are not zeroed, so a directory carved
//! from a fresh frame must be [`clear`](PageDirectory::clear)ed before use.

use crate::PageEntryBits;
use crate::page_table::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, VirtualAddress};

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// A single page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageDirectory>() == FRAME_SIZE as usize);

impl DirectoryIndex {
    /// Extract bits `[31:22]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> 22) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Point at the leaf table in `table`.
    ///
    /// Forces `present=1` and `PS=0`.
    #[inline]
    #[must_use]
    pub const fn make_table(table: FrameNumber, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_frame(table);
        Self(flags)
    }

    /// The leaf table frame, if present.
    #[inline]
    #[must_use]
    pub const fn table(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageDirectory {
    /// Mark every entry absent.
    #[inline]
    pub fn clear(&mut self) {
        self.entries.fill(PdEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must reload the root register when changing an active mapping.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> DirectoryIndex {
        DirectoryIndex::from(va)
    }

    /// Number of present entries.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entry_round_trip() {
        let e = PdEntry::make_table(FrameNumber::new(0x321), PageEntryBits::new_rw(true));
        assert_eq!(e.raw(), 0x0032_1007);
        assert_eq!(e.table(), Some(FrameNumber::new(0x321)));
        assert_eq!(PdEntry::from_raw(e.raw()), e);
        assert_eq!(PdEntry::zero().table(), None);
    }

    #[test]
    fn large_page_bit_is_forced_off() {
        let e = PdEntry::make_table(
            FrameNumber::new(1),
            PageEntryBits::new_kernel_rw().with_large_page(true),
        );
        assert!(!e.flags().large_page());
    }
}
