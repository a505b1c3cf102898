//! # Contiguous Frame Pool
//!
//! A [`FramePool`] manages the physical frames `[base, base + count)` and
//! hands out single frames or contiguous runs of frames. Runs are recorded
//! in a packed [`FrameStateMap`]: the first frame of a run is marked
//! [`HeadOfSequence`](FrameState::HeadOfSequence), the rest
//! [`Used`](FrameState::Used). Releasing a run only needs its first frame;
//! the extent is recovered by walking forward over `Used` frames.
//!
//! ## Bitmap placement
//!
//! The bitmap either lives in frames supplied by the caller (typically
//! allocated from another pool), or in the pool's own leading frames, which
//! are then reserved like [`mark_inaccessible`](FramePool::mark_inaccessible)
//! and never handed out.
//!
//! ## Invariants
//! - Every frame in range has exactly one state.
//! - `free_frames()` equals the number of `Free` frames.
//! - An allocated run of `n` frames is one head followed by `n - 1` used
//!   frames, bounded by a free frame, another head or the pool edge.

use crate::error::FramePoolError;
use crate::frame_state::{FRAMES_PER_BYTE, FRAMES_PER_INFO_FRAME, FrameState, FrameStateMap};
use crate::phys_mapper::PhysMapper;
use kernel_memory_addresses::FrameNumber;
use log::{debug, info};

/// Where a pool keeps its state bitmap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BitmapLocation {
    /// In the pool's own leading frame(s).
    Internal,
    /// In `needed_info_frames(count)` frames starting at this frame, outside
    /// the pool.
    External(FrameNumber),
}

impl From<Option<FrameNumber>> for BitmapLocation {
    fn from(info_frame: Option<FrameNumber>) -> Self {
        info_frame.map_or(Self::Internal, Self::External)
    }
}

/// Contiguous physical frame allocator with a 2-bit-per-frame bitmap.
#[derive(Debug)]
pub struct FramePool<'m> {
    base: FrameNumber,
    count: u32,
    location: BitmapLocation,
    map: FrameStateMap<'m>,
    free: u32,
}

impl<'m> FramePool<'m> {
    /// Number of 4 KiB frames needed to hold the bitmap of a pool of
    /// `frames` frames.
    ///
    /// ```rust
    /// # use kernel_alloc::frame_pool::FramePool;
    /// assert_eq!(FramePool::needed_info_frames(1), 1);
    /// assert_eq!(FramePool::needed_info_frames(16_384), 1);
    /// assert_eq!(FramePool::needed_info_frames(16_385), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn needed_info_frames(frames: u32) -> u32 {
        frames.div_ceil(FRAMES_PER_INFO_FRAME)
    }

    /// Build a pool whose bitmap lives in physical memory reached through
    /// `mapper`.
    ///
    /// With `info_frame == None` the bitmap occupies the pool's own leading
    /// frame(s); otherwise it occupies `needed_info_frames(count)` frames
    /// starting at `info_frame`.
    ///
    /// # Safety
    /// The bitmap frames must not be accessed through any other path while
    /// the pool is alive. When they come from another pool they must have
    /// been allocated from it.
    ///
    /// # Errors
    /// See [`with_storage`](Self::with_storage); additionally
    /// [`FramePoolError::StorageUnavailable`] if `mapper` does not cover the
    /// bitmap frames.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &'m M,
        base: FrameNumber,
        count: u32,
        info_frame: Option<FrameNumber>,
    ) -> Result<Self, FramePoolError> {
        Self::check_geometry(base, count)?;
        let info_frames = Self::needed_info_frames(count);
        let first = info_frame.unwrap_or(base);
        if !mapper.covers(first, info_frames) {
            return Err(FramePoolError::StorageUnavailable { frames: info_frames });
        }

        // SAFETY: The range is covered by the mapper; exclusivity is upheld
        // by the caller.
        let storage = unsafe { mapper.frame_bytes(first, info_frames) };
        Self::with_storage(base, count, info_frame.into(), storage)
    }

    /// Build a pool over caller-provided bitmap storage.
    ///
    /// The storage is reset, so all frames start `Free`. With
    /// [`BitmapLocation::Internal`] the leading `needed_info_frames(count)`
    /// frames are then reserved.
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyPool`] if `count == 0`.
    /// - [`FramePoolError::Misaligned`] if `count` is not a multiple of 4.
    /// - [`FramePoolError::OutOfRange`] if the pool runs past the last frame.
    /// - [`FramePoolError::InfoFrameInsidePool`] if external bitmap frames
    ///   overlap the pool.
    /// - [`FramePoolError::StorageUnavailable`] if `storage` is too small.
    pub fn with_storage(
        base: FrameNumber,
        count: u32,
        location: BitmapLocation,
        storage: &'m mut [u8],
    ) -> Result<Self, FramePoolError> {
        Self::check_geometry(base, count)?;
        let info_frames = Self::needed_info_frames(count);

        if let BitmapLocation::External(info) = location {
            let info_end = info.checked_add(info_frames).ok_or(FramePoolError::OutOfRange {
                first: info,
                count: info_frames,
            })?;
            if info < base + count && base < info_end {
                return Err(FramePoolError::InfoFrameInsidePool(info));
            }
        }

        let map = FrameStateMap::new(storage, count)
            .ok_or(FramePoolError::StorageUnavailable { frames: info_frames })?;

        let mut pool = Self {
            base,
            count,
            location,
            map,
            free: count,
        };

        if location == BitmapLocation::Internal {
            pool.mark_inaccessible(base, info_frames)?;
        }

        info!(
            "Frame pool {base}..{} ({count} frames), bitmap {location:?}, {} free",
            base + count,
            pool.free
        );
        Ok(pool)
    }

    fn check_geometry(base: FrameNumber, count: u32) -> Result<(), FramePoolError> {
        if count == 0 {
            return Err(FramePoolError::EmptyPool);
        }
        if !count.is_multiple_of(FRAMES_PER_BYTE) {
            return Err(FramePoolError::Misaligned(count));
        }
        match base.checked_add(count) {
            Some(end) if end.as_u32() <= FrameNumber::MAX.as_u32() + 1 => Ok(()),
            _ => Err(FramePoolError::OutOfRange { first: base, count }),
        }
    }

    #[inline]
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.count
    }

    /// One past the last managed frame.
    #[inline]
    #[must_use]
    pub fn end_frame(&self) -> FrameNumber {
        self.base + self.count
    }

    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.free
    }

    #[inline]
    #[must_use]
    pub const fn bitmap_location(&self) -> BitmapLocation {
        self.location
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame >= self.base && frame.distance_from(self.base) < self.count
    }

    /// State of `frame`, or `None` if the pool does not manage it.
    #[must_use]
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.contains(frame)
            .then(|| self.map.get(frame.distance_from(self.base)))
    }

    /// Allocate `n` contiguous frames and return the first one.
    ///
    /// First fit: the lowest-numbered run of `n` free frames wins.
    ///
    /// # Errors
    /// - [`FramePoolError::ZeroFrames`] if `n == 0`.
    /// - [`FramePoolError::Exhausted`] if fewer than `n` frames are free.
    /// - [`FramePoolError::NoContiguousRun`] if enough frames are free but
    ///   not in one piece.
    pub fn get_frames(&mut self, n: u32) -> Result<FrameNumber, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::ZeroFrames);
        }
        if n > self.free {
            return Err(FramePoolError::Exhausted {
                requested: n,
                free: self.free,
            });
        }

        let start = self
            .find_free_run(n)
            .ok_or(FramePoolError::NoContiguousRun { requested: n })?;

        self.map.set(start, FrameState::HeadOfSequence);
        for i in start + 1..start + n {
            self.map.set(i, FrameState::Used);
        }
        self.free -= n;

        let first = self.base + start;
        debug!("Allocated {n} frame(s) at {first}, {} free", self.free);
        Ok(first)
    }

    fn find_free_run(&self, n: u32) -> Option<u32> {
        let mut run_start = 0;
        let mut run_len = 0;
        for i in 0..self.count {
            if self.map.get(i).is_free() {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == n {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Reserve `[first, first + n)` without searching.
    ///
    /// `first` becomes a head and the rest become used, so the range can
    /// later be returned with a single release of `first`. Only frames that
    /// were free count against `free_frames()`.
    ///
    /// # Errors
    /// [`FramePoolError::OutOfRange`] if the range is not inside the pool.
    pub fn mark_inaccessible(&mut self, first: FrameNumber, n: u32) -> Result<(), FramePoolError> {
        let out_of_range = FramePoolError::OutOfRange { first, count: n };
        let end = first.checked_add(n).ok_or(out_of_range)?;
        if first < self.base || end > self.end_frame() {
            return Err(out_of_range);
        }
        if n == 0 {
            return Ok(());
        }

        let start = first.distance_from(self.base);
        for i in start..start + n {
            if self.map.get(i).is_free() {
                self.free -= 1;
            }
            let state = if i == start {
                FrameState::HeadOfSequence
            } else {
                FrameState::Used
            };
            self.map.set(i, state);
        }

        debug!("Marked {n} frame(s) at {first} inaccessible, {} free", self.free);
        Ok(())
    }

    /// Release the run starting at `first`; returns the number of frames
    /// freed.
    ///
    /// Frees `first` and every following `Used` frame up to (excluding) the
    /// next free or head frame, or the pool edge.
    ///
    /// # Errors
    /// - [`FramePoolError::OutOfRange`] if the pool does not manage `first`.
    /// - [`FramePoolError::NotHeadFrame`] if `first` does not start a run.
    pub fn release_frames(&mut self, first: FrameNumber) -> Result<u32, FramePoolError> {
        if !self.contains(first) {
            return Err(FramePoolError::OutOfRange { first, count: 1 });
        }

        let start = first.distance_from(self.base);
        if self.map.get(start) != FrameState::HeadOfSequence {
            return Err(FramePoolError::NotHeadFrame(first));
        }

        self.map.set(start, FrameState::Free);
        let mut released = 1;
        for i in start + 1..self.count {
            if self.map.get(i) != FrameState::Used {
                break;
            }
            self.map.set(i, FrameState::Free);
            released += 1;
        }
        self.free += released;

        debug!("Released {released} frame(s) at {first}, {} free", self.free);
        Ok(released)
    }

    /// Recount free frames from the bitmap; used to check the accounting
    /// invariant.
    #[must_use]
    pub fn count_free_in_bitmap(&self) -> u32 {
        self.map.count(FrameState::Free)
    }
}
