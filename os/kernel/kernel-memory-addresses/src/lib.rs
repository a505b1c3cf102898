//! # Frame Numbers and Memory Addresses
//!
//! Strongly typed wrappers for the three kinds of integers the memory core
//! juggles on a 32-bit, two-level paged machine:
//!
//! | Type | Space | Meaning |
//! |------|-------|---------|
//! | [`FrameNumber`] | physical index space | the `n`-th 4 KiB physical frame |
//! | [`PhysicalAddress`] | physical byte space | a byte in RAM / MMIO |
//! | [`VirtualAddress`] | virtual byte space | a byte as seen through the page tables |
//! | [`VirtualPage`] | virtual index space | the `n`-th 4 KiB virtual page |
//!
//! Frames are never materialized as objects; the allocator only ever hands
//! out frame numbers. Moving between index space and byte space is a single
//! multiply or divide by [`FRAME_SIZE`], and that conversion lives in exactly
//! one place per direction: [`FrameNumber::base_address`] and
//! [`PhysicalAddress::frame`] (and their virtual counterparts
//! [`VirtualPage::base`] / [`VirtualAddress::page`]).
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let frame = FrameNumber::new(512);
//! assert_eq!(frame.base_address().as_u32(), 2 * 1024 * 1024);
//! assert_eq!(frame.base_address().frame(), frame);
//!
//! let va = VirtualAddress::new(0x0040_1234);
//! assert_eq!(va.page().number(), 0x401);
//! assert_eq!(va.page_offset(), 0x234);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod frame_number;
mod physical_address;
mod virtual_address;
mod virtual_page;

pub use crate::frame_number::FrameNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

/// Size of one physical frame (and of one virtual page) in bytes.
pub const FRAME_SIZE: u32 = 4096;

/// `log2(FRAME_SIZE)`; the number of in-page offset bits of an address.
pub const FRAME_SHIFT: u32 = 12;

const _: () = assert!(1 << FRAME_SHIFT == FRAME_SIZE);

/// Number of whole frames needed to hold `bytes` bytes.
///
/// ```rust
/// # use kernel_memory_addresses::frames_for_bytes;
/// assert_eq!(frames_for_bytes(0), 0);
/// assert_eq!(frames_for_bytes(1), 1);
/// assert_eq!(frames_for_bytes(4096), 1);
/// assert_eq!(frames_for_bytes(4097), 2);
/// ```
#[inline]
#[must_use]
pub const fn frames_for_bytes(bytes: u32) -> u32 {
    bytes.div_ceil(FRAME_SIZE)
}

/// Align `x` up to the next multiple of [`FRAME_SIZE`].
///
/// Returns `None` if the aligned value does not fit into 32 bits.
#[inline]
#[must_use]
pub const fn page_align_up(x: u32) -> Option<u32> {
    match x.checked_add(FRAME_SIZE - 1) {
        Some(v) => Some(v & !(FRAME_SIZE - 1)),
        None => None,
    }
}

/// Align `x` down to the previous multiple of [`FRAME_SIZE`].
#[inline]
#[must_use]
pub const fn page_align_down(x: u32) -> u32 {
    x & !(FRAME_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(page_align_up(0), Some(0));
        assert_eq!(page_align_up(1), Some(4096));
        assert_eq!(page_align_up(4096), Some(4096));
        assert_eq!(page_align_up(u32::MAX), None);
        assert_eq!(page_align_up(0xFFFF_F000), Some(0xFFFF_F000));
        assert_eq!(page_align_down(8191), 4096);
    }

    #[test]
    fn frame_and_address_conversions_agree() {
        for n in [0u32, 1, 511, 512, 1024, 0xF_FFFF] {
            let frame = FrameNumber::new(n);
            assert_eq!(frame.base_address().frame(), frame);
            assert_eq!(frame.base_address().frame_offset(), 0);
        }

        let pa = PhysicalAddress::new(0x0040_0FFF);
        assert_eq!(pa.frame(), FrameNumber::new(0x400));
        assert_eq!(pa.frame_offset(), 0xFFF);
    }

    #[test]
    fn virtual_page_round_trip() {
        let va = VirtualAddress::new(0x4000_2ABC);
        let page = va.page();
        assert_eq!(page.base().as_u32(), 0x4000_2000);
        assert_eq!(page.base().page(), page);
        assert_eq!(VirtualPage::from_number(page.number()), page);
        assert_eq!(page.next().base().as_u32(), 0x4000_3000);
    }
}
