//! # Physical Frame Allocation
//!
//! This crate owns physical memory at frame granularity. It is the lowest
//! layer of the virtual-memory core and knows nothing about page tables.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Frame Pool Registry                 │
//! │    • all pools in construction order                │
//! │    • release by first frame, owner found by range   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                   Frame Pool                        │
//! │    • contiguous runs, first fit                     │
//! │    • 2-bit Free / Used / HeadOfSequence bitmap      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 Physical Mapper                     │
//! │    • frame number → pointer                         │
//! │    • identity mapping on bare metal, arena in tests │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`frame_pool::FramePool`]: allocator over one range of frames.
//! - [`registry::FramePools`]: the set of all pools; resolves which pool a
//!   released frame belongs to.
//! - [`frame_state::FrameStateMap`]: the packed per-frame state bitmap.
//! - [`phys_mapper::PhysMapper`]: access to frame contents.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::frame_pool::FramePool;
//! use kernel_alloc::phys_mapper::FrameArena;
//! use kernel_alloc::registry::FramePools;
//! use kernel_memory_addresses::FrameNumber;
//!
//! // Simulated RAM for frames 0..1025; frame 1024 holds the bitmap.
//! let ram = FrameArena::new(FrameNumber::new(0), 1025);
//! let pool = unsafe { FramePool::new(&ram, FrameNumber::new(0), 1024, Some(FrameNumber::new(1024))) }
//!     .expect("valid pool");
//!
//! let mut pools = FramePools::new();
//! let id = pools.register(pool).expect("no overlap");
//!
//! let run = pools.get_frames(id, 10).expect("frames available");
//! assert_eq!(run, FrameNumber::new(0));
//! assert_eq!(pools.release_frames(run), Ok(10));
//! ```
//!
//! ## Concurrency
//!
//! Nothing here locks. Callers run with a single active execution context
//! (boot code, or a trap path with interrupts disabled) and express
//! exclusivity through `&mut`.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod error;
pub mod frame_pool;
pub mod frame_state;
pub mod phys_mapper;
pub mod registry;

pub use error::FramePoolError;
pub use frame_pool::{BitmapLocation, FramePool};
pub use frame_state::FrameState;
pub use phys_mapper::{FrameArena, IdentityPhysMapper, PhysMapper};
pub use registry::{FramePools, PoolId};
