//! # Frame Pool Registry
//!
//! Runs are released by their first frame alone, without saying which pool
//! they came from. [`FramePools`] keeps every pool in construction order and
//! resolves the owner of a frame by range membership.

use crate::error::FramePoolError;
use crate::frame_pool::FramePool;
use alloc::vec::Vec;
use kernel_memory_addresses::FrameNumber;
use log::debug;

/// Index of a pool inside a [`FramePools`] registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PoolId(usize);

impl PoolId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Append-only collection of all frame pools.
#[derive(Debug, Default)]
pub struct FramePools<'m> {
    pools: Vec<FramePool<'m>>,
}

impl<'m> FramePools<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self { pools: Vec::new() }
    }

    /// Add `pool` and return its id.
    ///
    /// # Errors
    /// [`FramePoolError::Overlapping`] if the pool's frames overlap an
    /// already registered pool.
    pub fn register(&mut self, pool: FramePool<'m>) -> Result<PoolId, FramePoolError> {
        if let Some(existing) = self.pools.iter().position(|p| {
            pool.base_frame() < p.end_frame() && p.base_frame() < pool.end_frame()
        }) {
            return Err(FramePoolError::Overlapping(PoolId(existing)));
        }

        let id = PoolId(self.pools.len());
        debug!(
            "Registered frame pool {id:?} for {}..{}",
            pool.base_frame(),
            pool.end_frame()
        );
        self.pools.push(pool);
        Ok(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// # Errors
    /// [`FramePoolError::UnknownPool`] if `id` was not issued by this registry.
    pub fn get(&self, id: PoolId) -> Result<&FramePool<'m>, FramePoolError> {
        self.pools.get(id.0).ok_or(FramePoolError::UnknownPool(id))
    }

    /// # Errors
    /// [`FramePoolError::UnknownPool`] if `id` was not issued by this registry.
    pub fn get_mut(&mut self, id: PoolId) -> Result<&mut FramePool<'m>, FramePoolError> {
        self.pools.get_mut(id.0).ok_or(FramePoolError::UnknownPool(id))
    }

    /// The pool managing `frame`, if any.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.pools.iter().position(|p| p.contains(frame)).map(PoolId)
    }

    /// Allocate `n` contiguous frames from pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`] or any error of
    /// [`FramePool::get_frames`].
    pub fn get_frames(&mut self, id: PoolId, n: u32) -> Result<FrameNumber, FramePoolError> {
        self.get_mut(id)?.get_frames(n)
    }

    /// Release the run starting at `first` to whichever pool owns it.
    ///
    /// # Errors
    /// - [`FramePoolError::NoOwningPool`] if no registered pool manages
    ///   `first`.
    /// - [`FramePoolError::NotHeadFrame`] if `first` does not start a run.
    pub fn release_frames(&mut self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let owner = self
            .owner_of(first)
            .ok_or(FramePoolError::NoOwningPool(first))?;
        self.pools[owner.0].release_frames(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &FramePool<'m>)> {
        self.pools.iter().enumerate().map(|(i, p)| (PoolId(i), p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_pool::BitmapLocation;
    use crate::frame_state::bitmap_bytes;
    use alloc::vec;

    #[test]
    fn releases_resolve_to_the_owning_pool() {
        let mut low = vec![0u8; bitmap_bytes(64)];
        let mut high = vec![0u8; bitmap_bytes(64)];
        let mut pools = FramePools::new();
        let a = pools
            .register(
                FramePool::with_storage(FrameNumber::new(0), 64, BitmapLocation::Internal, &mut low)
                    .expect("low pool"),
            )
            .expect("registered");
        let b = pools
            .register(
                FramePool::with_storage(FrameNumber::new(64), 64, BitmapLocation::Internal, &mut high)
                    .expect("high pool"),
            )
            .expect("registered");

        let fa = pools.get_frames(a, 3).expect("from a");
        let fb = pools.get_frames(b, 5).expect("from b");
        assert_eq!(fa, FrameNumber::new(1));
        assert_eq!(fb, FrameNumber::new(65));
        assert_eq!(pools.owner_of(fb), Some(b));

        assert_eq!(pools.release_frames(fb), Ok(5));
        assert_eq!(pools.get(a).map(FramePool::free_frames), Ok(60));
        assert_eq!(pools.get(b).map(FramePool::free_frames), Ok(63));
    }

    #[test]
    fn unowned_frames_are_rejected() {
        let mut storage = vec![0u8; bitmap_bytes(8)];
        let mut pools = FramePools::new();
        pools
            .register(
                FramePool::with_storage(FrameNumber::new(8), 8, BitmapLocation::Internal, &mut storage)
                    .expect("pool"),
            )
            .expect("registered");

        assert_eq!(
            pools.release_frames(FrameNumber::new(16)),
            Err(FramePoolError::NoOwningPool(FrameNumber::new(16)))
        );
        assert_eq!(pools.owner_of(FrameNumber::new(7)), None);
    }

    #[test]
    fn overlapping_pools_are_rejected() {
        let mut s1 = vec![0u8; bitmap_bytes(16)];
        let mut s2 = vec![0u8; bitmap_bytes(16)];
        let mut pools = FramePools::new();
        let first = pools
            .register(
                FramePool::with_storage(FrameNumber::new(0), 16, BitmapLocation::Internal, &mut s1)
                    .expect("pool"),
            )
            .expect("registered");
        let overlapping =
            FramePool::with_storage(FrameNumber::new(12), 16, BitmapLocation::Internal, &mut s2)
                .expect("pool");
        assert_eq!(
            pools.register(overlapping).err(),
            Some(FramePoolError::Overlapping(first))
        );
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn unknown_pool_id() {
        let mut pools = FramePools::new();
        assert_eq!(
            pools.get_frames(PoolId(3), 1),
            Err(FramePoolError::UnknownPool(PoolId(3)))
        );
    }
}
