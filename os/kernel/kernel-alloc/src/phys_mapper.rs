//! # Physical Memory Access
//!
//! Page tables and frame-pool bitmaps live in physical frames. Code can only
//! dereference virtual addresses, so every access to a frame's contents goes
//! through a [`PhysMapper`], which turns a [`FrameNumber`] into a pointer in
//! the current address space.
//!
//! Two mappers are provided:
//!
//! - [`IdentityPhysMapper`] for bare metal, where the frames in question sit
//!   inside the identity-mapped shared region (`pa == va`).
//! - [`FrameArena`] for hosted tests, which simulates a window of physical
//!   memory with heap-allocated, 4 KiB-aligned frames.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::{FrameArena, PhysMapper};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let arena = FrameArena::new(FrameNumber::new(512), 4);
//! assert!(arena.covers(FrameNumber::new(512), 4));
//! assert!(!arena.covers(FrameNumber::new(515), 2));
//!
//! let bytes = unsafe { arena.frame_bytes(FrameNumber::new(513), 1) };
//! bytes[0] = 0xAA;
//! assert_eq!(unsafe { arena.frame_bytes(FrameNumber::new(513), 1) }[0], 0xAA);
//! ```

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{FRAME_SIZE, FrameNumber};

/// Turns frame numbers into dereferenceable pointers.
pub trait PhysMapper {
    /// Pointer to the first byte of `frame`.
    ///
    /// # Safety
    /// `frame` must be covered by this mapper (see [`covers`](Self::covers)).
    unsafe fn frame_ptr(&self, frame: FrameNumber) -> *mut u8;

    /// Whether the frames `[first, first + count)` are all reachable.
    fn covers(&self, first: FrameNumber, count: u32) -> bool;

    /// View `frame` as a `T`.
    ///
    /// # Safety
    /// - `frame` must be covered by this mapper.
    /// - The frame's bytes must be a valid `T` and `T` must fit into one frame.
    /// - The caller must ensure no other live reference aliases the frame
    ///   for `'a`.
    unsafe fn frame_to_mut<'a, T>(&self, frame: FrameNumber) -> &'a mut T {
        debug_assert!(size_of::<T>() <= FRAME_SIZE as usize);
        // SAFETY: Upheld by the caller.
        unsafe { &mut *self.frame_ptr(frame).cast::<T>() }
    }

    /// View the frames `[first, first + count)` as one byte slice.
    ///
    /// # Safety
    /// - The whole range must be covered by this mapper and contiguous in
    ///   the mapped view.
    /// - The caller must ensure no other live reference aliases the range
    ///   for `'a`.
    unsafe fn frame_bytes<'a>(&self, first: FrameNumber, count: u32) -> &'a mut [u8] {
        let len = count as usize * FRAME_SIZE as usize;
        // SAFETY: Upheld by the caller.
        unsafe { core::slice::from_raw_parts_mut(self.frame_ptr(first), len) }
    }
}

/// [`PhysMapper`] for frames inside an identity-mapped region (`va == pa`).
///
/// # Safety
/// Only frames that are identity mapped in the active address space (or any
/// frame while paging is still disabled) may be accessed.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn frame_ptr(&self, frame: FrameNumber) -> *mut u8 {
        frame.base_address().as_u32() as usize as *mut u8
    }

    fn covers(&self, first: FrameNumber, count: u32) -> bool {
        first
            .checked_add(count)
            .is_some_and(|end| end.as_u32() <= FrameNumber::MAX.as_u32() + 1)
    }
}

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Frame([u8; FRAME_SIZE as usize]);

const _: () = assert!(size_of::<Frame>() == FRAME_SIZE as usize);

/// A heap-backed window of simulated physical memory.
///
/// Covers the frames `[base, base + count)`; all frames start zeroed.
/// Accessing a frame outside the window panics.
pub struct FrameArena {
    base: FrameNumber,
    frames: Box<[UnsafeCell<Frame>]>,
}

impl FrameArena {
    #[must_use]
    pub fn new(base: FrameNumber, count: u32) -> Self {
        let frames = (0..count)
            .map(|_| UnsafeCell::new(Frame([0; FRAME_SIZE as usize])))
            .collect();
        Self { base, frames }
    }

    #[must_use]
    pub const fn base(&self) -> FrameNumber {
        self.base
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Copy of the 4-byte little-endian word at `offset` inside `frame`.
    ///
    /// Convenience for tests that inspect table entries without going
    /// through a typed view.
    ///
    /// # Panics
    /// If `frame` is outside the arena or `offset + 4` exceeds the frame.
    #[must_use]
    pub fn read_u32(&self, frame: FrameNumber, offset: usize) -> u32 {
        let cell = &self.frames[self.slot(frame)];
        // SAFETY: Shared read of plain bytes; no `&mut` into this frame is
        // held across this call by the arena's users.
        let bytes = unsafe { &(*cell.get()).0 };
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    fn slot(&self, frame: FrameNumber) -> usize {
        assert!(
            frame >= self.base && frame.distance_from(self.base) < self.frame_count(),
            "{frame:?} is outside the simulated memory window"
        );
        frame.distance_from(self.base) as usize
    }
}

impl PhysMapper for FrameArena {
    unsafe fn frame_ptr(&self, frame: FrameNumber) -> *mut u8 {
        // Derived from the slice pointer so multi-frame views keep provenance
        // over the whole arena.
        let slot = self.slot(frame);
        UnsafeCell::raw_get(self.frames.as_ptr().wrapping_add(slot)).cast::<u8>()
    }

    fn covers(&self, first: FrameNumber, count: u32) -> bool {
        let Some(end) = first.checked_add(count) else {
            return false;
        };
        first >= self.base && end.distance_from(self.base) <= self.frame_count()
    }
}
