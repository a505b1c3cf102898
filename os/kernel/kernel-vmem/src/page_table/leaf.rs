//! # Leaf Page Table
//!
//! - [`TableIndex`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a leaf entry (PTE) mapping one 4 KiB frame.
//! - [`LeafTable`]: a 4 KiB-aligned array of 1024 PTEs.

use crate::PageEntryBits;
use crate::page_table::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, VirtualAddress};

/// Index into a leaf table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A single leaf entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// A leaf page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct LeafTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<LeafTable>() == FRAME_SIZE as usize);

impl TableIndex {
    /// Extract bits `[21:12]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> 12) & 0x3FF) as u16)
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

impl PtEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A non-present entry that still carries `flags` (e.g. the user bit).
    #[inline]
    #[must_use]
    pub const fn absent(mut flags: PageEntryBits) -> Self {
        flags.set_present(false);
        Self(flags)
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

    /// Map `frame`. Forces `present=1` and clears PAT.
    #[inline]
    #[must_use]
    pub const fn make_4k(frame: FrameNumber, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_frame(frame);
        Self(flags)
    }

    /// The mapped frame, if present.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<FrameNumber> {
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

impl LeafTable {
    /// Set every entry to `entry`.
    #[inline]
    pub fn fill(&mut self, entry: PtEntry) {
        self.entries.fill(entry);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must reload the root register when changing an active mapping.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> TableIndex {
        TableIndex::from(va)
    }

    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_entry_maps_frame() {
        let e = PtEntry::make_4k(FrameNumber::new(0x5555), PageEntryBits::new_rw(false));
        assert_eq!(e.frame(), Some(FrameNumber::new(0x5555)));
        assert!(e.flags().writable());
        assert!(!e.flags().user_access());
        assert_eq!(e.raw(), 0x0555_5003);
    }

    #[test]
    fn absent_entry_keeps_user_tag() {
        let e = PtEntry::absent(PageEntryBits::new_absent_user());
        assert_eq!(e.raw(), 0b100);
        assert_eq!(e.frame(), None);
    }
}
