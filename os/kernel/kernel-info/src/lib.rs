//! # Kernel Memory Configuration
//!
//! This crate is the single source of truth for the physical memory layout
//! the virtual-memory core is brought up with. It carries no logic beyond
//! validating that a layout is self-consistent; the allocators and the
//! paging code consume it through [`memory::MemoryLayout`].
//!
//! ## Default Boot Layout
//!
//! ```text
//! Physical Memory Layout (4 KiB frames):
//! 0x0000_0000 ┌─────────────────────────────────┐ frame 0
//!             │  Low memory and kernel image    │
//! 0x0020_0000 ├─────────────────────────────────┤ frame 512
//!             │  Kernel frame pool              │  (bitmap in its own first frame)
//! 0x0040_0000 ├─────────────────────────────────┤ frame 1024
//!             │  Process frame pool             │  (bitmap in kernel-pool frames)
//! 0x00F0_0000 ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤ frame 3840
//!             │  Memory hole (inaccessible)     │
//! 0x0100_0000 ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤ frame 4096
//!             │  Process frame pool (cont.)     │
//! 0x0200_0000 └─────────────────────────────────┘ frame 8192
//! ```
//!
//! The first [`SHARED_REGION_BYTES`](memory::SHARED_REGION_BYTES) of virtual
//! memory are identity mapped in every address space, which covers the
//! kernel image and the whole kernel pool.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::MemoryLayout;
//!
//! let layout = MemoryLayout::DEFAULT.with_memory_hole(None);
//! assert!(layout.validate().is_ok());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
