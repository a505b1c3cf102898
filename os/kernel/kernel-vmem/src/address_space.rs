//! # Address Space Handle
//!
//! A [`PageTable`] names one address space by the frame of its page
//! directory. It is a plain `Copy` handle: building, loading and mutating
//! tables goes through [`Paging`](crate::paging::Paging), which owns the
//! frame pools and the MMU. The handle itself only offers read-only walks.
//!
//! ## Walk
//!
//! ```text
//! va ──► DirectoryIndex ──► PdEntry ── absent ──► Lookup::NoLeafTable
//!                              │
//!                              └─► LeafTable ──► PtEntry ── absent ──► Lookup::Absent
//!                                                    │
//!                                                    └─► Lookup::Mapped(frame)
//! ```

use crate::page_table::directory::PageDirectory;
use crate::page_table::leaf::{LeafTable, PtEntry};
use crate::page_table::split_indices;
use crate::paging::PagingError;
use kernel_alloc::PhysMapper;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};

/// Handle to one two-level address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageTable {
    directory: FrameNumber,
}

/// Result of walking a [`PageTable`] for one virtual address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Lookup {
    /// The directory entry is absent.
    NoLeafTable,
    /// The leaf table exists but the entry is absent.
    Absent { table: FrameNumber, entry: PtEntry },
    /// The address is mapped.
    Mapped { table: FrameNumber, entry: PtEntry },
}

impl Lookup {
    /// The mapped frame, if any.
    #[must_use]
    pub const fn frame(self) -> Option<FrameNumber> {
        match self {
            Self::Mapped { entry, .. } => entry.frame(),
            Self::NoLeafTable | Self::Absent { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped { .. })
    }
}

impl PageTable {
    /// Refer to an existing directory.
    #[inline]
    #[must_use]
    pub const fn from_directory(directory: FrameNumber) -> Self {
        Self { directory }
    }

    #[inline]
    #[must_use]
    pub const fn directory_frame(self) -> FrameNumber {
        self.directory
    }

    /// Physical address the root register is loaded with.
    #[inline]
    #[must_use]
    pub const fn root_address(self) -> PhysicalAddress {
        self.directory.base_address()
    }

    /// Walk the tables for `va`.
    ///
    /// # Errors
    /// [`PagingError::TableFrameUnavailable`] if `mapper` cannot reach a
    /// table frame on the walk.
    pub fn lookup<M: PhysMapper>(self, mapper: &M, va: VirtualAddress) -> Result<Lookup, PagingError> {
        let (di, ti) = split_indices(va);

        let directory: &PageDirectory = table_ref(mapper, self.directory)?;
        let Some(table) = directory.get(di).table() else {
            return Ok(Lookup::NoLeafTable);
        };

        let leaf: &LeafTable = table_ref(mapper, table)?;
        let entry = leaf.get(ti);
        if entry.is_present() {
            Ok(Lookup::Mapped { table, entry })
        } else {
            Ok(Lookup::Absent { table, entry })
        }
    }

    /// Translate `va` to the physical address it maps to, if mapped.
    #[must_use]
    pub fn translate<M: PhysMapper>(self, mapper: &M, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.lookup(mapper, va).ok()?.frame()?;
        Some(frame.base_address() + va.page_offset())
    }
}

/// Shared view of a table frame.
pub(crate) fn table_ref<'a, M: PhysMapper, T>(
    mapper: &M,
    frame: FrameNumber,
) -> Result<&'a T, PagingError> {
    if !mapper.covers(frame, 1) {
        return Err(PagingError::TableFrameUnavailable(frame));
    }
    // SAFETY: The frame is covered and holds a table of type `T`; table
    // frames are only reachable through `Paging`, which hands out no
    // long-lived references.
    Ok(unsafe { mapper.frame_to_mut::<T>(frame) })
}

/// Exclusive view of a table frame.
pub(crate) fn table_mut<'a, M: PhysMapper, T>(
    mapper: &M,
    frame: FrameNumber,
) -> Result<&'a mut T, PagingError> {
    if !mapper.covers(frame, 1) {
        return Err(PagingError::TableFrameUnavailable(frame));
    }
    // SAFETY: See `table_ref`; callers keep the reference local to one
    // operation.
    Ok(unsafe { mapper.frame_to_mut::<T>(frame) })
}
