//! # Virtual Memory Pools
//!
//! A [`VmPool`] reserves named regions inside one address space. Reserving
//! a region does no page-table work; the pages are backed lazily by
//! [`Paging::handle_fault`], which asks the [`VmPoolRegistry`] whether the
//! faulting address belongs to any pool at all.
//!
//! ```text
//! base                                                       base + size
//! ├─ bookkeeping ─┬─ region 1 ─┬─ region 2 ─┬── unused ───────────┤
//! │   1 page      │            │            │                     │
//! ```
//!
//! Regions are appended after the last one. Releasing a region compacts the
//! region list but not the address range, so space freed in the middle is
//! only reused once every region after it is gone too.

use crate::address_space::PageTable;
use crate::mmu::Mmu;
use crate::paging::{Paging, PagingError};
use alloc::vec::Vec;
use kernel_alloc::{FramePoolError, PhysMapper, PoolId};
use kernel_memory_addresses::{FRAME_SIZE, VirtualAddress, VirtualPage, page_align_up};
use log::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmPoolError {
    #[error(transparent)]
    Paging(#[from] PagingError),
    #[error(transparent)]
    FramePool(#[from] FramePoolError),
    #[error("requested {requested:#x} bytes but only {available:#x} are available")]
    OutOfVirtualMemory { requested: u32, available: u32 },
    #[error("no region starts at {0}")]
    UnknownRegion(VirtualAddress),
    #[error("region table is full")]
    RegionTableFull,
    #[error("pool of {0:#x} bytes cannot hold its bookkeeping page")]
    PoolTooSmall(u32),
    #[error("pool {base}+{size:#x} is not page aligned or wraps the address space")]
    MisalignedPool { base: VirtualAddress, size: u32 },
    #[error("pool {base}+{size:#x} overlaps the shared region below {shared_end:#x}")]
    OverlapsSharedRegion { base: VirtualAddress, size: u32, shared_end: u32 },
    #[error("zero-sized allocation")]
    ZeroSize,
}

/// Position of a pool in the [`VmPoolRegistry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VmPoolId(usize);

impl VmPoolId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Append-only list of pool bounds, consulted on every fault.
#[derive(Debug, Default)]
pub struct VmPoolRegistry {
    bounds: Vec<(VirtualAddress, u32)>,
}

impl VmPoolRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { bounds: Vec::new() }
    }

    pub fn register(&mut self, base: VirtualAddress, size: u32) -> VmPoolId {
        self.bounds.push((base, size));
        VmPoolId(self.bounds.len() - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Whether any registered pool contains `va`.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> bool {
        self.owner_of(va).is_some()
    }

    /// First pool whose bounds contain `va`.
    #[must_use]
    pub fn owner_of(&self, va: VirtualAddress) -> Option<VmPoolId> {
        self.bounds
            .iter()
            .position(|&(base, size)| va.is_within(base, size))
            .map(VmPoolId)
    }
}

/// A reserved range of virtual memory.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VmRegion {
    pub base: VirtualAddress,
    /// Multiple of [`FRAME_SIZE`].
    pub length: u32,
}

impl VmRegion {
    /// First address past the region.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.base.as_u32()) + u64::from(self.length)
    }

    /// Pages covered by the region.
    pub fn pages(&self) -> impl Iterator<Item = VirtualPage> + use<> {
        let first = self.base.page().number();
        (first..first + self.length / FRAME_SIZE).map(VirtualPage::from_number)
    }
}

/// A pool of virtual regions in one address space.
#[derive(Debug)]
pub struct VmPool {
    id: VmPoolId,
    base: VirtualAddress,
    size: u32,
    frame_pool: PoolId,
    page_table: PageTable,
    regions: Vec<VmRegion>,
    available: u32,
}

impl VmPool {
    /// Regions that fit in the one bookkeeping page.
    pub const MAX_REGIONS: usize = FRAME_SIZE as usize / size_of::<VmRegion>();

    /// Reserve `[base, base + size)` in `page_table` and register it.
    ///
    /// The first page holds the pool's bookkeeping and is never handed out.
    ///
    /// # Errors
    /// - [`VmPoolError::MisalignedPool`] if `base` or `size` is not page
    ///   aligned, or the range wraps past 4 GiB.
    /// - [`VmPoolError::PoolTooSmall`] if `size` is below one page.
    /// - [`VmPoolError::OverlapsSharedRegion`] if the range reaches into the
    ///   identity-mapped shared region.
    /// - [`VmPoolError::FramePool`] if `frame_pool` is not registered.
    pub fn new<M: PhysMapper, U: Mmu>(
        paging: &mut Paging<'_, M, U>,
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
        page_table: PageTable,
    ) -> Result<Self, VmPoolError> {
        if !base.is_page_aligned() || !size.is_multiple_of(FRAME_SIZE) {
            return Err(VmPoolError::MisalignedPool { base, size });
        }
        if size < FRAME_SIZE {
            return Err(VmPoolError::PoolTooSmall(size));
        }
        if u64::from(base.as_u32()) + u64::from(size) > 1 << 32 {
            return Err(VmPoolError::MisalignedPool { base, size });
        }
        let shared_end = paging.config().shared_region_bytes;
        if base.as_u32() < shared_end {
            return Err(VmPoolError::OverlapsSharedRegion { base, size, shared_end });
        }
        paging.frame_pools().get(frame_pool)?;

        let mut regions = Vec::with_capacity(Self::MAX_REGIONS);
        regions.push(VmRegion {
            base,
            length: FRAME_SIZE,
        });

        let id = paging.register_vm_pool(base, size);
        info!("VM pool {} at {base}, {size:#x} bytes", id.index());

        Ok(Self {
            id,
            base,
            size,
            frame_pool,
            page_table,
            regions,
            available: size - FRAME_SIZE,
        })
    }

    #[must_use]
    pub const fn id(&self) -> VmPoolId {
        self.id
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn frame_pool(&self) -> PoolId {
        self.frame_pool
    }

    #[must_use]
    pub const fn page_table(&self) -> PageTable {
        self.page_table
    }

    /// Live regions; index 0 is the bookkeeping page.
    #[must_use]
    pub fn regions(&self) -> &[VmRegion] {
        &self.regions
    }

    #[must_use]
    pub const fn available_memory(&self) -> u32 {
        self.available
    }

    /// Reserve `size` bytes, rounded up to whole pages.
    ///
    /// # Errors
    /// - [`VmPoolError::ZeroSize`] for `size == 0`.
    /// - [`VmPoolError::OutOfVirtualMemory`] if the rounded size exceeds
    ///   the available memory or would run past the end of the pool.
    /// - [`VmPoolError::RegionTableFull`] if no region slot is left.
    pub fn allocate(&mut self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        if size == 0 {
            return Err(VmPoolError::ZeroSize);
        }
        let out_of_memory = VmPoolError::OutOfVirtualMemory {
            requested: size,
            available: self.available,
        };
        let length = page_align_up(size).ok_or(out_of_memory)?;
        if length > self.available {
            return Err(out_of_memory);
        }
        if self.regions.len() >= Self::MAX_REGIONS {
            return Err(VmPoolError::RegionTableFull);
        }

        let start = self.regions.last().map_or(u64::from(self.base.as_u32()), VmRegion::end);
        let pool_end = u64::from(self.base.as_u32()) + u64::from(self.size);
        if start + u64::from(length) > pool_end {
            return Err(out_of_memory);
        }

        #[allow(clippy::cast_possible_truncation)]
        let base = VirtualAddress::new(start as u32);
        self.regions.push(VmRegion { base, length });
        self.available -= length;

        debug!("VM pool {}: region {base}+{length:#x}", self.id.index());
        Ok(base)
    }

    /// Release the region starting at `start`.
    ///
    /// Every page of the region that was backed by a fault is unmapped and
    /// its frame returned. All pages are checked before the first one is
    /// unmapped, so on error the region and its mappings are unchanged.
    ///
    /// # Errors
    /// - [`VmPoolError::UnknownRegion`] if no region starts at `start`.
    /// - [`VmPoolError::Paging`] if a backed page cannot be released.
    pub fn release<M: PhysMapper, U: Mmu>(
        &mut self,
        paging: &mut Paging<'_, M, U>,
        start: VirtualAddress,
    ) -> Result<(), VmPoolError> {
        let index = self.regions[1..]
            .iter()
            .position(|r| r.base == start)
            .map(|i| i + 1)
            .ok_or(VmPoolError::UnknownRegion(start))?;
        let region = self.regions[index];

        let mut backed = Vec::new();
        for page in region.pages() {
            if paging.releasable_frame(self.page_table, page)?.is_some() {
                backed.push(page);
            }
        }
        for &page in &backed {
            paging.free_page(self.page_table, page)?;
        }

        self.regions.remove(index);
        self.available += region.length;

        debug!(
            "VM pool {}: released {start}+{:#x}, {} backed page(s)",
            self.id.index(),
            region.length,
            backed.len()
        );
        Ok(())
    }

    /// Whether `va` lies inside the pool's bounds.
    ///
    /// Only the outer bounds are checked, so addresses in the bookkeeping
    /// page or between regions count as legitimate.
    #[must_use]
    pub const fn is_legitimate(&self, va: VirtualAddress) -> bool {
        va.is_within(self.base, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{Lookup, table_mut};
    use crate::fault::PageFaultError;
    use crate::mmu::RecordingMmu;
    use crate::page_table::leaf::{LeafTable, PtEntry, TableIndex};
    use crate::paging::PagingConfig;
    use kernel_alloc::{FrameArena, FramePool, FramePools};
    use kernel_memory_addresses::FrameNumber;

    const POOL_BASE: u32 = 0x4000_0000;

    fn paging(ram: &FrameArena) -> Paging<'_, FrameArena, RecordingMmu> {
        let mut pools = FramePools::new();
        let kernel = pools
            .register(unsafe { FramePool::new(ram, FrameNumber::new(512), 512, None) }.expect("kernel"))
            .expect("registered");
        let info = pools.get_frames(kernel, 1).expect("info frame");
        let process = pools
            .register(
                unsafe { FramePool::new(ram, FrameNumber::new(1024), 512, Some(info)) }.expect("process"),
            )
            .expect("registered");
        let config = PagingConfig {
            kernel_pool: kernel,
            process_pool: process,
            shared_region_bytes: 4 << 20,
        };
        Paging::init(ram, RecordingMmu::new(), pools, config).expect("paging")
    }

    fn pool(paging: &mut Paging<'_, FrameArena, RecordingMmu>, size: u32) -> VmPool {
        let table = paging.construct().expect("table");
        let process = paging.config().process_pool;
        VmPool::new(paging, VirtualAddress::new(POOL_BASE), size, process, table).expect("pool")
    }

    #[test]
    fn region_capacity_fills_one_page() {
        assert_eq!(VmPool::MAX_REGIONS, 512);
    }

    #[test]
    fn construction_reserves_bookkeeping_page() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let pool = pool(&mut paging, 1 << 20);

        assert_eq!(pool.available_memory(), (1 << 20) - FRAME_SIZE);
        assert_eq!(
            pool.regions(),
            &[VmRegion {
                base: VirtualAddress::new(POOL_BASE),
                length: FRAME_SIZE
            }]
        );
        assert_eq!(paging.vm_pools().len(), 1);
        assert!(paging.is_legitimate(VirtualAddress::new(POOL_BASE)));
    }

    #[test]
    fn construction_rejects_bad_geometry() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let table = paging.construct().expect("table");
        let process = paging.config().process_pool;

        let err = VmPool::new(&mut paging, VirtualAddress::new(POOL_BASE + 1), 0x1000, process, table);
        assert!(matches!(err, Err(VmPoolError::MisalignedPool { .. })));

        let err = VmPool::new(&mut paging, VirtualAddress::new(POOL_BASE), 0, process, table);
        assert_eq!(err.err(), Some(VmPoolError::PoolTooSmall(0)));

        let err = VmPool::new(&mut paging, VirtualAddress::new(0xFFFF_F000), 0x2000, process, table);
        assert!(matches!(err, Err(VmPoolError::MisalignedPool { .. })));

        assert!(paging.vm_pools().is_empty());
    }

    #[test]
    fn allocations_are_page_rounded_and_appended() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let mut pool = pool(&mut paging, 1 << 20);

        let a = pool.allocate(1).expect("a");
        let b = pool.allocate(0x2001).expect("b");
        assert_eq!(a, VirtualAddress::new(POOL_BASE + 0x1000));
        assert_eq!(b, VirtualAddress::new(POOL_BASE + 0x2000));
        assert_eq!(pool.regions()[2].length, 0x3000);
        assert_eq!(pool.available_memory(), (1 << 20) - 0x5000);
    }

    #[test]
    fn allocation_errors() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let mut pool = pool(&mut paging, 0x4000);

        assert_eq!(pool.allocate(0), Err(VmPoolError::ZeroSize));
        assert_eq!(
            pool.allocate(0x4000),
            Err(VmPoolError::OutOfVirtualMemory {
                requested: 0x4000,
                available: 0x3000
            })
        );
        pool.allocate(0x3000).expect("exact fit");
        assert_eq!(pool.available_memory(), 0);
    }

    #[test]
    fn released_middle_space_is_not_reused_past_the_end() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let mut pool = pool(&mut paging, 0x4000);

        let a = pool.allocate(0x1000).expect("a");
        pool.allocate(0x2000).expect("b");
        pool.release(&mut paging, a).expect("released");

        assert_eq!(pool.available_memory(), 0x1000);
        assert!(matches!(
            pool.allocate(0x1000),
            Err(VmPoolError::OutOfVirtualMemory { .. })
        ));
    }

    #[test]
    fn release_requires_exact_region_base() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let mut pool = pool(&mut paging, 1 << 20);
        let a = pool.allocate(0x2000).expect("a");

        let inside = VirtualAddress::new(a.as_u32() + 0x1000);
        assert_eq!(pool.release(&mut paging, inside), Err(VmPoolError::UnknownRegion(inside)));

        let bookkeeping = VirtualAddress::new(POOL_BASE);
        assert_eq!(
            pool.release(&mut paging, bookkeeping),
            Err(VmPoolError::UnknownRegion(bookkeeping))
        );
        assert_eq!(pool.regions().len(), 2);
    }

    #[test]
    fn legitimacy_is_outer_bound_only() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let pool = pool(&mut paging, 0x10_0000);

        assert!(pool.is_legitimate(VirtualAddress::new(POOL_BASE)));
        assert!(pool.is_legitimate(VirtualAddress::new(POOL_BASE + 0xF_FFFF)));
        assert!(!pool.is_legitimate(VirtualAddress::new(POOL_BASE + 0x10_0000)));
        assert!(!pool.is_legitimate(VirtualAddress::new(POOL_BASE - 1)));
    }

    #[test]
    fn registry_resolves_owner() {
        let mut registry = VmPoolRegistry::new();
        let a = registry.register(VirtualAddress::new(0x4000_0000), 0x1000);
        let b = registry.register(VirtualAddress::new(0x8000_0000), 0x1000);

        assert_eq!(registry.owner_of(VirtualAddress::new(0x8000_0FFF)), Some(b));
        assert_eq!(registry.owner_of(VirtualAddress::new(0x4000_0000)), Some(a));
        assert_eq!(registry.owner_of(VirtualAddress::new(0x4000_1000)), None);
    }

    #[test]
    fn pools_may_not_reach_into_the_shared_region() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let table = paging.construct().expect("table");
        let process = paging.config().process_pool;

        let err = VmPool::new(&mut paging, VirtualAddress::new(0x0020_0000), 0x1_0000, process, table);
        assert_eq!(
            err.err(),
            Some(VmPoolError::OverlapsSharedRegion {
                base: VirtualAddress::new(0x0020_0000),
                size: 0x1_0000,
                shared_end: 4 << 20
            })
        );
        assert!(paging.vm_pools().is_empty());

        VmPool::new(&mut paging, VirtualAddress::new(4 << 20), 0x1_0000, process, table).expect("right above");
    }

    #[test]
    fn failed_release_leaves_region_and_mappings_intact() {
        let ram = FrameArena::new(FrameNumber::new(512), 1024);
        let mut paging = paging(&ram);
        let mut pool = pool(&mut paging, 1 << 20);
        let table = pool.page_table();
        paging.load(table);

        let region = pool.allocate(2 * FRAME_SIZE).expect("region");
        let second = VirtualAddress::new(region.as_u32() + FRAME_SIZE);
        for va in [region, second] {
            paging.handle_fault(va, PageFaultError::new()).expect("fault");
        }

        // Point the second page at a kernel frame.
        let Ok(Lookup::Mapped { table: leaf_frame, entry }) = paging.lookup(table, second) else {
            panic!("second page not mapped");
        };
        let leaf: &mut LeafTable = table_mut(&ram, leaf_frame).expect("leaf");
        leaf.set(TableIndex::from(second), PtEntry::make_4k(FrameNumber::new(512), entry.flags()));

        let process = paging.config().process_pool;
        let free = paging.frame_pools().get(process).map(FramePool::free_frames);
        let available = pool.available_memory();

        assert_eq!(
            pool.release(&mut paging, region),
            Err(VmPoolError::Paging(PagingError::NotProcessFrame(FrameNumber::new(512))))
        );
        assert!(paging.lookup(table, region).expect("walk").is_mapped());
        assert_eq!(paging.frame_pools().get(process).map(FramePool::free_frames), free);
        assert_eq!(pool.available_memory(), available);
        assert_eq!(pool.regions().len(), 2);
    }
}
