//! # Packed Tri-State Frame Bitmap
//!
//! Every frame of a pool is tracked with two bits:
//!
//! | Bits | State |
//! |------|-------|
//! | `00` | [`FrameState::Free`] |
//! | `01` | [`FrameState::Used`] |
//! | `10` | [`FrameState::HeadOfSequence`] |
//!
//! `11` is never written; should it ever be read it decodes as `Used`, so a
//! corrupted pair can never be handed out again.
//!
//! Frame `i` lives in byte `i / 4` at bit offset `2 * (i % 4)`.

use kernel_memory_addresses::FRAME_SIZE;

/// Bits of bitmap storage per tracked frame.
pub const BITS_PER_FRAME: u32 = 2;

/// Frames tracked by a single bitmap byte.
pub const FRAMES_PER_BYTE: u32 = 8 / BITS_PER_FRAME;

/// Frames tracked by a single 4 KiB bitmap frame.
pub const FRAMES_PER_INFO_FRAME: u32 = FRAME_SIZE * FRAMES_PER_BYTE;

const STATE_MASK: u8 = 0b11;

/// Allocation state of one physical frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    /// Available for allocation.
    Free = 0b00,
    /// Allocated; continues the run started by the preceding head.
    Used = 0b01,
    /// Allocated; the first frame of a run.
    HeadOfSequence = 0b10,
}

impl FrameState {
    #[inline]
    const fn from_bits(bits: u8) -> Self {
        match bits & STATE_MASK {
            0b00 => Self::Free,
            0b10 => Self::HeadOfSequence,
            _ => Self::Used,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Bitmap bytes needed to track `frames` frames.
#[inline]
#[must_use]
pub const fn bitmap_bytes(frames: u32) -> usize {
    frames.div_ceil(FRAMES_PER_BYTE) as usize
}

/// Two-bit-per-frame state map over borrowed storage.
#[derive(Debug)]
pub struct FrameStateMap<'m> {
    bits: &'m mut [u8],
    len: u32,
}

impl<'m> FrameStateMap<'m> {
    /// Wrap `storage` to track `len` frames, resetting every frame to Free.
    ///
    /// Returns `None` if `storage` is too small.
    pub fn new(storage: &'m mut [u8], len: u32) -> Option<Self> {
        let needed = bitmap_bytes(len);
        let bits = storage.get_mut(..needed)?;
        bits.fill(0);
        Some(Self { bits, len })
    }

    /// Number of frames tracked.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// State of the frame at `index` (relative to the pool base).
    ///
    /// ### Panics
    /// If `index >= len`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> FrameState {
        let (byte, shift) = self.locate(index);
        FrameState::from_bits(self.bits[byte] >> shift)
    }

    /// Set the state of the frame at `index`.
    ///
    /// ### Panics
    /// If `index >= len`.
    #[inline]
    pub fn set(&mut self, index: u32, state: FrameState) {
        let (byte, shift) = self.locate(index);
        let b = &mut self.bits[byte];
        *b = (*b & !(STATE_MASK << shift)) | ((state as u8) << shift);
    }

    /// Number of frames currently in `state`.
    #[must_use]
    pub fn count(&self, state: FrameState) -> u32 {
        (0..self.len).filter(|&i| self.get(i) == state).map(|_| 1).sum()
    }

    #[inline]
    fn locate(&self, index: u32) -> (usize, u32) {
        assert!(index < self.len, "frame index {index} out of range ({})", self.len);
        let byte = (index / FRAMES_PER_BYTE) as usize;
        let shift = (index % FRAMES_PER_BYTE) * BITS_PER_FRAME;
        (byte, shift)
    }
}
