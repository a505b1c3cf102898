//! # Memory Layout

use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, PhysicalAddress};

/// First frame of the kernel frame pool (2 MiB).
pub const KERNEL_POOL_START_FRAME: FrameNumber = FrameNumber::new(512);

/// Size of the kernel frame pool in frames (2 MiB).
pub const KERNEL_POOL_FRAMES: u32 = 512;

/// First frame of the process frame pool (4 MiB).
pub const PROCESS_POOL_START_FRAME: FrameNumber = FrameNumber::new(1024);

/// Size of the process frame pool in frames (28 MiB).
pub const PROCESS_POOL_FRAMES: u32 = 7168;

/// First frame of the memory hole at 15 MiB.
pub const MEM_HOLE_START_FRAME: FrameNumber = FrameNumber::new(3840);

/// Size of the memory hole in frames (1 MiB).
pub const MEM_HOLE_FRAMES: u32 = 256;

/// Bytes of virtual memory identity mapped into every address space (4 MiB).
pub const SHARED_REGION_BYTES: u32 = 4 * 1024 * 1024;

const _: () = {
    assert!(KERNEL_POOL_START_FRAME.as_u32() + KERNEL_POOL_FRAMES <= PROCESS_POOL_START_FRAME.as_u32());
    assert!(MEM_HOLE_START_FRAME.as_u32() >= PROCESS_POOL_START_FRAME.as_u32());
    assert!(
        MEM_HOLE_START_FRAME.as_u32() + MEM_HOLE_FRAMES
            <= PROCESS_POOL_START_FRAME.as_u32() + PROCESS_POOL_FRAMES
    );
    assert!(SHARED_REGION_BYTES.is_multiple_of(FRAME_SIZE));
};

/// A half-open run of physical frames `[base, base + count)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameRange {
    pub base: FrameNumber,
    pub count: u32,
}

impl FrameRange {
    #[inline]
    #[must_use]
    pub const fn new(base: FrameNumber, count: u32) -> Self {
        Self { base, count }
    }

    /// One past the last frame, or `None` if the range runs off the
    /// 32-bit physical address space.
    #[must_use]
    pub const fn end(&self) -> Option<FrameNumber> {
        match self.base.checked_add(self.count) {
            Some(end) if end.as_u32() <= FrameNumber::MAX.as_u32() + 1 => Some(end),
            _ => None,
        }
    }

    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        frame.as_u32() >= self.base.as_u32() && frame.as_u32() - self.base.as_u32() < self.count
    }

    /// Whether `other` lies completely inside `self`.
    #[must_use]
    pub const fn covers(&self, other: &Self) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => {
                other.base.as_u32() >= self.base.as_u32() && other_end.as_u32() <= end.as_u32()
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => {
                self.base.as_u32() < other_end.as_u32() && other.base.as_u32() < end.as_u32()
            }
            _ => true,
        }
    }
}

/// Which of the two frame pools a [`LayoutError`] refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PoolKind {
    Kernel,
    Process,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("the {0:?} frame pool is empty")]
    EmptyPool(PoolKind),
    #[error("the {0:?} frame pool extends past the 32-bit physical address space")]
    PoolOutOfRange(PoolKind),
    #[error("the kernel and process frame pools overlap")]
    PoolsOverlap,
    #[error("the memory hole {0:?} is not inside the process frame pool")]
    HoleOutsideProcessPool(FrameRange),
    #[error("the shared region size {0:#x} is zero or not a multiple of the frame size")]
    MisalignedSharedRegion(u32),
    #[error("the shared region ends at {shared_end} but the kernel pool ends at {kernel_pool_end}")]
    SharedRegionTooSmall {
        shared_end: PhysicalAddress,
        kernel_pool_end: PhysicalAddress,
    },
}

/// Physical memory layout the memory system is brought up with.
///
/// The kernel pool keeps its bitmap in its own leading frame(s). The
/// process pool keeps its bitmap in frames taken from the kernel pool. Page
/// tables are carved from the kernel pool, so the shared identity-mapped
/// region has to cover the kernel pool completely.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryLayout {
    pub kernel_pool: FrameRange,
    pub process_pool: FrameRange,
    /// Frames inside the process pool that must never be handed out.
    pub memory_hole: Option<FrameRange>,
    /// Bytes of virtual memory identity mapped into every address space.
    pub shared_region_bytes: u32,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        kernel_pool: FrameRange::new(KERNEL_POOL_START_FRAME, KERNEL_POOL_FRAMES),
        process_pool: FrameRange::new(PROCESS_POOL_START_FRAME, PROCESS_POOL_FRAMES),
        memory_hole: Some(FrameRange::new(MEM_HOLE_START_FRAME, MEM_HOLE_FRAMES)),
        shared_region_bytes: SHARED_REGION_BYTES,
    };

    #[must_use]
    pub const fn with_kernel_pool(mut self, base: FrameNumber, count: u32) -> Self {
        self.kernel_pool = FrameRange::new(base, count);
        self
    }

    #[must_use]
    pub const fn with_process_pool(mut self, base: FrameNumber, count: u32) -> Self {
        self.process_pool = FrameRange::new(base, count);
        self
    }

    #[must_use]
    pub const fn with_memory_hole(mut self, hole: Option<FrameRange>) -> Self {
        self.memory_hole = hole;
        self
    }

    #[must_use]
    pub const fn with_shared_region_bytes(mut self, bytes: u32) -> Self {
        self.shared_region_bytes = bytes;
        self
    }

    /// Check that the layout is self-consistent.
    ///
    /// # Errors
    /// Returns the first [`LayoutError`] found. Per-pool bitmap granularity
    /// is checked by the frame pools themselves.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (kind, pool) in [
            (PoolKind::Kernel, &self.kernel_pool),
            (PoolKind::Process, &self.process_pool),
        ] {
            if pool.count == 0 {
                return Err(LayoutError::EmptyPool(kind));
            }
            if pool.end().is_none() {
                return Err(LayoutError::PoolOutOfRange(kind));
            }
        }

        if self.kernel_pool.overlaps(&self.process_pool) {
            return Err(LayoutError::PoolsOverlap);
        }

        if let Some(hole) = self.memory_hole
            && !self.process_pool.covers(&hole)
        {
            return Err(LayoutError::HoleOutsideProcessPool(hole));
        }

        if self.shared_region_bytes == 0 || !self.shared_region_bytes.is_multiple_of(FRAME_SIZE) {
            return Err(LayoutError::MisalignedSharedRegion(self.shared_region_bytes));
        }

        let kernel_pool_end = self
            .kernel_pool
            .end()
            .ok_or(LayoutError::PoolOutOfRange(PoolKind::Kernel))?
            .base_address();
        let shared_end = PhysicalAddress::new(self.shared_region_bytes);
        if kernel_pool_end.as_u32() > shared_end.as_u32() {
            return Err(LayoutError::SharedRegionTooSmall {
                shared_end,
                kernel_pool_end,
            });
        }

        Ok(())
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        assert_eq!(MemoryLayout::default().validate(), Ok(()));
        assert_eq!(MemoryLayout::DEFAULT.kernel_pool.end(), Some(FrameNumber::new(1024)));
        assert_eq!(MemoryLayout::DEFAULT.process_pool.end(), Some(FrameNumber::new(8192)));
    }

    #[test]
    fn overlapping_pools_are_rejected() {
        let layout = MemoryLayout::DEFAULT.with_process_pool(FrameNumber::new(1000), 1024);
        assert_eq!(layout.validate(), Err(LayoutError::PoolsOverlap));
    }

    #[test]
    fn hole_must_sit_inside_process_pool() {
        let hole = FrameRange::new(FrameNumber::new(600), 8);
        let layout = MemoryLayout::DEFAULT.with_memory_hole(Some(hole));
        assert_eq!(layout.validate(), Err(LayoutError::HoleOutsideProcessPool(hole)));
    }

    #[test]
    fn shared_region_must_cover_kernel_pool() {
        let layout = MemoryLayout::DEFAULT.with_shared_region_bytes(2 * 1024 * 1024);
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::SharedRegionTooSmall { .. })
        ));

        let layout = MemoryLayout::DEFAULT.with_shared_region_bytes(4 * 1024 * 1024 + 1);
        assert!(matches!(layout.validate(), Err(LayoutError::MisalignedSharedRegion(_))));
    }

    #[test]
    fn empty_pool_is_rejected() {
        let layout = MemoryLayout::DEFAULT.with_kernel_pool(FrameNumber::new(512), 0);
        assert_eq!(layout.validate(), Err(LayoutError::EmptyPool(PoolKind::Kernel)));
    }

    #[test]
    fn frame_range_queries() {
        let r = FrameRange::new(FrameNumber::new(10), 5);
        assert!(r.contains(FrameNumber::new(10)));
        assert!(r.contains(FrameNumber::new(14)));
        assert!(!r.contains(FrameNumber::new(15)));
        assert!(!r.contains(FrameNumber::new(9)));
        assert!(r.covers(&FrameRange::new(FrameNumber::new(11), 4)));
        assert!(!r.covers(&FrameRange::new(FrameNumber::new(11), 5)));
        assert!(r.overlaps(&FrameRange::new(FrameNumber::new(14), 1)));
        assert!(!r.overlaps(&FrameRange::new(FrameNumber::new(15), 1)));
    }
}
