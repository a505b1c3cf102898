//! # Memory Bring-Up
//!
//! Turns a [`MemoryLayout`] into a running memory system:
//!
//! 1. kernel pool, bitmap in its own first frame;
//! 2. process pool, bitmap in frames taken from the kernel pool;
//! 3. the memory hole marked inaccessible in the process pool;
//! 4. paging configured, the first address space built, loaded and enabled.

use crate::address_space::PageTable;
use crate::mmu::Mmu;
use crate::paging::{Paging, PagingConfig, PagingError};
use kernel_alloc::{FramePool, FramePoolError, FramePools, PhysMapper};
use kernel_info::memory::{LayoutError, MemoryLayout};
use log::info;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    FramePool(#[from] FramePoolError),
    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// The paging context together with the kernel's own address space.
pub struct MemorySystem<'m, M: PhysMapper, U: Mmu> {
    pub paging: Paging<'m, M, U>,
    pub kernel_table: PageTable,
}

impl<'m, M: PhysMapper, U: Mmu> MemorySystem<'m, M, U> {
    /// Bring up frame pools and paging for `layout`.
    ///
    /// # Safety
    /// `mapper` must grant exclusive access to every frame of both pools
    /// for `'m`, and nothing else may use those frames.
    ///
    /// # Errors
    /// Any layout, pool or paging error encountered on the way.
    pub unsafe fn bootstrap(mapper: &'m M, mmu: U, layout: &MemoryLayout) -> Result<Self, BootstrapError> {
        layout.validate()?;

        let mut pools = FramePools::new();

        let kernel = layout.kernel_pool;
        // SAFETY: Exclusive access is guaranteed by the caller.
        let kernel_pool = unsafe { FramePool::new(mapper, kernel.base, kernel.count, None) }?;
        let kernel_pool = pools.register(kernel_pool)?;

        let process = layout.process_pool;
        let info_frames = FramePool::needed_info_frames(process.count);
        let info_frame = pools.get_frames(kernel_pool, info_frames)?;
        // SAFETY: See above; the info frames were just taken from the kernel pool.
        let process_pool = unsafe { FramePool::new(mapper, process.base, process.count, Some(info_frame)) }?;
        let process_pool = pools.register(process_pool)?;

        if let Some(hole) = layout.memory_hole {
            pools.get_mut(process_pool)?.mark_inaccessible(hole.base, hole.count)?;
            info!("Memory hole {}..+{} marked inaccessible", hole.base, hole.count);
        }

        let config = PagingConfig {
            kernel_pool,
            process_pool,
            shared_region_bytes: layout.shared_region_bytes,
        };
        let mut paging = Paging::init(mapper, mmu, pools, config)?;

        let kernel_table = paging.construct()?;
        paging.load(kernel_table);
        paging.enable_paging()?;

        Ok(Self { paging, kernel_table })
    }
}
