//! # Paging Context
//!
//! [`Paging`] is the one value that owns everything address translation
//! needs:
//!
//! - the frame-pool registry, plus which pool feeds kernel structures and
//!   which feeds process pages,
//! - the size of the identity-mapped region shared by all address spaces,
//! - the VM-pool registry used to judge faulting addresses,
//! - the [`Mmu`] and the currently active [`PageTable`].
//!
//! Configuration happens once in [`Paging::init`]; address spaces can only
//! be [`construct`](Paging::construct)ed afterwards, so "configure before
//! construct" holds by construction.

use crate::address_space::{Lookup, PageTable, table_mut, table_ref};
use crate::mmu::Mmu;
use crate::page_entry_bits::PageEntryBits;
use crate::page_table::directory::{DirectoryIndex, PageDirectory, PdEntry};
use crate::page_table::leaf::{LeafTable, PtEntry, TableIndex};
use crate::page_table::{BYTES_PER_LEAF_TABLE, ENTRIES_PER_TABLE, split_indices};
use crate::vm_pool::{VmPoolId, VmPoolRegistry};
use alloc::vec::Vec;
use kernel_alloc::{FramePoolError, FramePools, FrameState, PhysMapper, PoolId};
use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, VirtualAddress, VirtualPage, frames_for_bytes};
use log::{debug, info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error(transparent)]
    FramePool(#[from] FramePoolError),
    #[error("access to {0} lies outside every registered VM pool")]
    IllegalAccess(VirtualAddress),
    #[error("page {0} is not mapped")]
    PageNotMapped(VirtualPage),
    #[error("no page table has been loaded")]
    NoActiveTable,
    #[error("shared region size {0:#x} is zero or not page aligned")]
    MisalignedSharedRegion(u32),
    #[error("shared region size {0:#x} leaves no room for demand-paged memory")]
    SharedRegionTooLarge(u32),
    #[error("table frame {0} is not reachable through the physical mapper")]
    TableFrameUnavailable(FrameNumber),
    #[error("frame {0} does not belong to the process pool")]
    NotProcessFrame(FrameNumber),
}

/// Process-wide paging configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PagingConfig {
    /// Pool for page directories and shared-region leaf tables.
    pub kernel_pool: PoolId,
    /// Pool for demand-created leaf tables and backing frames.
    pub process_pool: PoolId,
    /// Bytes identity mapped at the bottom of every address space.
    pub shared_region_bytes: u32,
}

impl PagingConfig {
    /// Leaf tables needed to cover the shared region.
    #[must_use]
    pub const fn shared_leaf_tables(&self) -> u32 {
        self.shared_region_bytes.div_ceil(BYTES_PER_LEAF_TABLE)
    }
}

/// Owner of the paging state.
pub struct Paging<'m, M: PhysMapper, U: Mmu> {
    mapper: &'m M,
    mmu: U,
    pools: FramePools<'m>,
    config: PagingConfig,
    vm_pools: VmPoolRegistry,
    active: Option<PageTable>,
    enabled: bool,
}

impl<'m, M: PhysMapper, U: Mmu> Paging<'m, M, U> {
    /// One-time configuration of the paging system.
    ///
    /// # Errors
    /// - [`PagingError::MisalignedSharedRegion`] if the shared region is
    ///   empty or not a whole number of pages.
    /// - [`PagingError::SharedRegionTooLarge`] if it would occupy every
    ///   directory slot.
    /// - [`PagingError::FramePool`] if either pool id is unknown.
    pub fn init(
        mapper: &'m M,
        mmu: U,
        pools: FramePools<'m>,
        config: PagingConfig,
    ) -> Result<Self, PagingError> {
        let shared = config.shared_region_bytes;
        if shared == 0 || !shared.is_multiple_of(FRAME_SIZE) {
            return Err(PagingError::MisalignedSharedRegion(shared));
        }
        if config.shared_leaf_tables() as usize >= ENTRIES_PER_TABLE {
            return Err(PagingError::SharedRegionTooLarge(shared));
        }
        pools.get(config.kernel_pool)?;
        pools.get(config.process_pool)?;

        info!(
            "Paging initialized: kernel pool {:?}, process pool {:?}, shared region {shared:#x} bytes",
            config.kernel_pool, config.process_pool
        );

        Ok(Self {
            mapper,
            mmu,
            pools,
            config,
            vm_pools: VmPoolRegistry::new(),
            active: None,
            enabled: false,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PagingConfig {
        &self.config
    }

    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[must_use]
    pub const fn mmu(&self) -> &U {
        &self.mmu
    }

    #[must_use]
    pub const fn frame_pools(&self) -> &FramePools<'m> {
        &self.pools
    }

    pub const fn frame_pools_mut(&mut self) -> &mut FramePools<'m> {
        &mut self.pools
    }

    #[must_use]
    pub const fn vm_pools(&self) -> &VmPoolRegistry {
        &self.vm_pools
    }

    #[must_use]
    pub const fn active(&self) -> Option<PageTable> {
        self.active
    }

    #[must_use]
    pub const fn is_paging_enabled(&self) -> bool {
        self.enabled
    }

    /// Build a new address space.
    ///
    /// Takes one directory frame and the leaf tables covering the shared
    /// region from the kernel pool. Shared pages are identity mapped
    /// (present, writable, supervisor); every other directory slot is
    /// absent.
    ///
    /// # Errors
    /// [`PagingError::FramePool`] if the kernel pool runs out, or
    /// [`PagingError::TableFrameUnavailable`] if a table frame cannot be
    /// reached. Frames taken before the failure are returned.
    pub fn construct(&mut self) -> Result<PageTable, PagingError> {
        let mut taken: Vec<FrameNumber> = Vec::new();
        let result = self.construct_into(&mut taken);
        if result.is_err() {
            for frame in taken {
                self.pools.release_frames(frame)?;
            }
        }
        result
    }

    #[allow(clippy::cast_possible_truncation)]
    fn construct_into(&mut self, taken: &mut Vec<FrameNumber>) -> Result<PageTable, PagingError> {
        let kernel = self.config.kernel_pool;

        let dir_frame = self.pools.get_frames(kernel, 1)?;
        taken.push(dir_frame);
        let directory: &mut PageDirectory = table_mut(self.mapper, dir_frame)?;
        directory.clear();

        let shared_pages = frames_for_bytes(self.config.shared_region_bytes);
        let tables = self.config.shared_leaf_tables();
        for t in 0..tables {
            let leaf_frame = self.pools.get_frames(kernel, 1)?;
            taken.push(leaf_frame);
            let leaf: &mut LeafTable = table_mut(self.mapper, leaf_frame)?;

            for i in 0..ENTRIES_PER_TABLE as u32 {
                let page = t * ENTRIES_PER_TABLE as u32 + i;
                let entry = if page < shared_pages {
                    PtEntry::make_4k(FrameNumber::new(page), PageEntryBits::new_kernel_rw())
                } else {
                    PtEntry::zero()
                };
                leaf.set(TableIndex::new(i as u16), entry);
            }

            directory.set(
                DirectoryIndex::new(t as u16),
                PdEntry::make_table(leaf_frame, PageEntryBits::new_kernel_rw()),
            );
        }

        info!(
            "Constructed page table at {dir_frame} with {tables} shared leaf table(s) covering {shared_pages} pages"
        );
        Ok(PageTable::from_directory(dir_frame))
    }

    /// Make `table` the active address space.
    pub fn load(&mut self, table: PageTable) {
        self.mmu.load_root(table.root_address());
        self.active = Some(table);
        debug!("Loaded page table {}", table.directory_frame());
    }

    /// Turn on paging.
    ///
    /// # Errors
    /// [`PagingError::NoActiveTable`] if no table was loaded first.
    pub fn enable_paging(&mut self) -> Result<(), PagingError> {
        if self.active.is_none() {
            return Err(PagingError::NoActiveTable);
        }
        if self.enabled {
            return Ok(());
        }
        self.mmu.enable_paging();
        self.enabled = true;
        info!("Paging enabled");
        Ok(())
    }

    /// Record a VM pool's bounds for fault legitimacy checks.
    pub fn register_vm_pool(&mut self, base: VirtualAddress, size: u32) -> VmPoolId {
        self.vm_pools.register(base, size)
    }

    /// Whether any registered VM pool contains `va`.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> bool {
        self.vm_pools.is_legitimate(va)
    }

    /// Walk `table` for `va`.
    ///
    /// # Errors
    /// [`PagingError::TableFrameUnavailable`] if a table frame is not
    /// reachable.
    pub fn lookup(&self, table: PageTable, va: VirtualAddress) -> Result<Lookup, PagingError> {
        table.lookup(self.mapper, va)
    }

    /// The process-pool frame backing `page`, if it is mapped.
    ///
    /// Performs the checks of [`free_page`](Self::free_page) without
    /// changing anything.
    ///
    /// # Errors
    /// - [`PagingError::NotProcessFrame`] if the page is backed by a frame
    ///   outside the process pool, e.g. in the shared identity region.
    /// - [`PagingError::FramePool`] if the frame is not the head of a run.
    pub fn releasable_frame(&self, table: PageTable, page: VirtualPage) -> Result<Option<FrameNumber>, PagingError> {
        let Some(frame) = table.lookup(self.mapper, page.base())?.frame() else {
            return Ok(None);
        };

        let process = self.pools.get(self.config.process_pool)?;
        match process.state(frame) {
            None => Err(PagingError::NotProcessFrame(frame)),
            Some(FrameState::HeadOfSequence) => Ok(Some(frame)),
            Some(_) => Err(FramePoolError::NotHeadFrame(frame).into()),
        }
    }

    /// Unmap `page` in `table` and return its frame to the process pool.
    ///
    /// Reloads the active root afterwards so no stale translation survives.
    /// On error the entry is left untouched.
    ///
    /// # Errors
    /// - [`PagingError::PageNotMapped`] if the page has no present entry.
    /// - [`PagingError::NotProcessFrame`] if the frame is not owned by the
    ///   process pool.
    /// - [`PagingError::FramePool`] if the frame is not the head of a run.
    pub fn free_page(&mut self, table: PageTable, page: VirtualPage) -> Result<FrameNumber, PagingError> {
        let frame = self
            .releasable_frame(table, page)?
            .ok_or(PagingError::PageNotMapped(page))?;

        let (di, ti) = split_indices(page.base());
        let directory: &PageDirectory = table_ref(self.mapper, table.directory_frame())?;
        let leaf_frame = directory.get(di).table().ok_or(PagingError::PageNotMapped(page))?;
        let leaf: &mut LeafTable = table_mut(self.mapper, leaf_frame)?;

        self.pools.get_mut(self.config.process_pool)?.release_frames(frame)?;
        let user = leaf.get(ti).flags().user_access();
        leaf.set(ti, PtEntry::absent(PageEntryBits::new().with_user_access(user)));
        trace!("Cleared PTE for {page} (was {frame})");

        if let Some(active) = self.active {
            self.mmu.load_root(active.root_address());
            trace!("Reloaded root {} to flush translations", active.directory_frame());
        }

        debug!("Freed page {page}, released frame {frame}");
        Ok(frame)
    }

    /// Split borrow used by the fault path.
    pub(crate) fn fault_parts(&mut self) -> (&'m M, &mut FramePools<'m>, &VmPoolRegistry, PagingConfig) {
        (self.mapper, &mut self.pools, &self.vm_pools, self.config)
    }
}
