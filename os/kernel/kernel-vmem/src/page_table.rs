//! # Two-Level Page Tables (32-bit, no PAE)
//!
//! Each 32-bit virtual address is split 10/10/12:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//! ```
//!
//! ```text
//!  CR3 → PageDirectory ──PDE──► LeafTable ──PTE──► 4 KiB frame
//! ```
//!
//! Both levels are one 4 KiB frame holding 1024 four-byte entries. A
//! directory entry is either absent or points at a leaf table; a leaf entry
//! is either absent or maps one frame.
//!
//! - [`directory`]: [`PageDirectory`](directory::PageDirectory), [`PdEntry`](directory::PdEntry), [`DirectoryIndex`](directory::DirectoryIndex).
//! - [`leaf`]: [`LeafTable`](leaf::LeafTable), [`PtEntry`](leaf::PtEntry), [`TableIndex`](leaf::TableIndex).

pub mod directory;
pub mod leaf;

use crate::page_table::directory::DirectoryIndex;
use crate::page_table::leaf::TableIndex;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in either table level.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual memory covered by one leaf table (4 MiB).
pub const BYTES_PER_LEAF_TABLE: u32 = 1 << 22;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_split_ten_ten_twelve() {
        let (d, t) = split_indices(VirtualAddress::new(0x4000_1234));
        assert_eq!(d.as_usize(), 0x100);
        assert_eq!(t.as_usize(), 0x001);

        let (d, t) = split_indices(VirtualAddress::new(0xFFFF_FFFF));
        assert_eq!(d.as_usize(), 1023);
        assert_eq!(t.as_usize(), 1023);
    }
}
