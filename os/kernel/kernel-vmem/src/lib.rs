//! # Virtual Memory Support
//!
//! Demand-paged 32-bit x86 address translation on top of the
//! [`kernel_alloc`] frame pools.
//!
//! ## What you get
//! - A two-level [`page_table`] model (directory + leaf tables, 10/10/12
//!   split) over the raw [`PageEntryBits`].
//! - [`Paging`]: one-time configuration, address-space construction, root
//!   loading, paging enable and explicit unmapping.
//! - [`Paging::handle_fault`]: lazily backs missing pages from the process
//!   pool, for addresses inside a registered [`VmPool`].
//! - [`VmPool`]: page-granular regions reserved in one address space.
//! - [`MemorySystem::bootstrap`]: brings the default boot layout up in one
//!   call.
//!
//! ## Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//!
//!  CR3 → PageDirectory ──PDE──► LeafTable ──PTE──► 4 KiB frame
//! ```
//!
//! ## Demand paging
//!
//! ```text
//! VmPool::allocate ──► region reserved, nothing mapped
//!        │
//!   first touch ──► #PF ──► dispatch_fault ──► Paging::handle_fault
//!                                                 ├─ outside all VM pools → IllegalAccess
//!                                                 ├─ no leaf table → leaf + frame from process pool
//!                                                 └─ absent PTE   → frame from process pool
//! ```
//!
//! Hardware access is abstracted behind [`Mmu`] and
//! [`PhysMapper`](kernel_alloc::PhysMapper), so everything here runs on a
//! development host against a [`FrameArena`](kernel_alloc::FrameArena) and a
//! [`RecordingMmu`].
//!
//! ## Example
//! ```rust
//! use kernel_alloc::FrameArena;
//! use kernel_info::memory::MemoryLayout;
//! use kernel_memory_addresses::{FrameNumber, VirtualAddress};
//! use kernel_vmem::{FaultResolution, MemorySystem, PageFaultError, RecordingMmu, VmPool};
//!
//! let layout = MemoryLayout::DEFAULT
//!     .with_process_pool(FrameNumber::new(1024), 1024)
//!     .with_memory_hole(None);
//! let ram = FrameArena::new(FrameNumber::new(512), 1536);
//! let mut mem = unsafe { MemorySystem::bootstrap(&ram, RecordingMmu::new(), &layout) }.unwrap();
//!
//! let process = mem.paging.config().process_pool;
//! let mut heap = VmPool::new(&mut mem.paging, VirtualAddress::new(0x4000_0000), 1 << 20, process, mem.kernel_table).unwrap();
//! let region = heap.allocate(8192).unwrap();
//!
//! let fault = mem.paging.handle_fault(region, PageFaultError::new().with_write(true)).unwrap();
//! assert!(matches!(fault, FaultResolution::LeafTableCreated { .. }));
//! assert!(mem.kernel_table.translate(&ram, region).is_some());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

pub mod address_space;
pub mod bootstrap;
pub mod fault;
pub mod mmu;
mod page_entry_bits;
pub mod page_table;
pub mod paging;
pub mod vm_pool;

pub use crate::address_space::{Lookup, PageTable};
pub use crate::bootstrap::{BootstrapError, MemorySystem};
pub use crate::fault::{FaultContext, FaultResolution, PageFaultError, dispatch_fault};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::{Mmu, MmuEvent, RecordingMmu};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::paging::{Paging, PagingConfig, PagingError};
pub use crate::vm_pool::{VmPool, VmPoolError, VmPoolId, VmPoolRegistry, VmRegion};
