//! # Demand Paging
//!
//! The platform's trap path hands `(faulting address, error code)` to
//! [`Paging::handle_fault`]. Missing mappings inside a registered VM pool
//! are backed on the spot with frames from the process pool:
//!
//! ```text
//! PDE absent ──► leaf table + backing frame   (2 frames)
//! PTE absent ──► backing frame                (1 frame)
//! present    ──► protection violation, ignored
//! ```
//!
//! Backing frames are handed out as-is. Their previous contents are not
//! cleared.

use crate::address_space::table_mut;
use crate::mmu::Mmu;
use crate::page_entry_bits::PageEntryBits;
use crate::page_table::directory::{PageDirectory, PdEntry};
use crate::page_table::leaf::{LeafTable, PtEntry};
use crate::page_table::split_indices;
use crate::paging::{Paging, PagingError};
use bitfield_struct::bitfield;
use kernel_alloc::PhysMapper;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};
use log::{debug, error, trace, warn};

/// Page-fault error code layout (32-bit x86).
///
/// Each bit describes the condition that caused the page fault.
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch (execute access).
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation (if CR4.PKE=1).
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access (if CET-SS enabled).
    pub shadow_stack: bool, // bit 6

    #[bits(25)]
    __: u32, // reserved / ignored bits
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// A decoded page fault.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FaultContext {
    pub address: VirtualAddress,
    /// The walk hit an absent entry (error bit 0 clear).
    pub missing_mapping: bool,
    pub write: bool,
    pub user: bool,
}

impl FaultContext {
    #[must_use]
    pub const fn new(address: VirtualAddress, error: PageFaultError) -> Self {
        Self {
            address,
            missing_mapping: !error.present(),
            write: error.write(),
            user: error.user(),
        }
    }

    /// Decode the raw error code pushed by the CPU.
    #[must_use]
    pub const fn from_raw(address: VirtualAddress, error_code: u32) -> Self {
        Self::new(address, PageFaultError::from_bits(error_code))
    }
}

/// What [`Paging::handle_fault`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultResolution {
    /// The page was present; nothing changed.
    ProtectionViolation,
    /// Another fault already backed the page.
    AlreadyMapped,
    /// A backing frame was installed in an existing leaf table.
    PageMapped { frame: FrameNumber },
    /// A leaf table was created, then the backing frame installed.
    LeafTableCreated { table: FrameNumber, frame: FrameNumber },
}

impl FaultResolution {
    /// The frame now backing the faulting page, if one was installed.
    #[must_use]
    pub const fn frame(self) -> Option<FrameNumber> {
        match self {
            Self::PageMapped { frame } | Self::LeafTableCreated { frame, .. } => Some(frame),
            Self::ProtectionViolation | Self::AlreadyMapped => None,
        }
    }
}

impl<M: PhysMapper, U: Mmu> Paging<'_, M, U> {
    /// Resolve a page fault in the active address space.
    ///
    /// # Errors
    /// - [`PagingError::NoActiveTable`] if nothing was loaded.
    /// - [`PagingError::IllegalAccess`] if VM pools are registered and none
    ///   contains `address`. Nothing is changed.
    /// - [`PagingError::FramePool`] if the process pool is exhausted. Frames
    ///   taken before the failure are returned.
    pub fn handle_fault(
        &mut self,
        address: VirtualAddress,
        error: PageFaultError,
    ) -> Result<FaultResolution, PagingError> {
        let ctx = FaultContext::new(address, error);
        if !ctx.missing_mapping {
            warn!("Ignoring protection fault at {address}: {}", error.explain());
            return Ok(FaultResolution::ProtectionViolation);
        }

        let table = self.active().ok_or(PagingError::NoActiveTable)?;
        let (mapper, pools, vm_pools, config) = self.fault_parts();

        if !vm_pools.is_empty() && !vm_pools.is_legitimate(address) {
            error!("Illegal access at {address}: outside every VM pool");
            return Err(PagingError::IllegalAccess(address));
        }

        let (di, ti) = split_indices(address);
        let directory: &mut PageDirectory = table_mut(mapper, table.directory_frame())?;
        let pde = directory.get(di);

        let resolution = if let Some(leaf_frame) = pde.table() {
            let leaf: &mut LeafTable = table_mut(mapper, leaf_frame)?;
            if leaf.get(ti).is_present() {
                return Ok(FaultResolution::AlreadyMapped);
            }

            let frame = pools.get_frames(config.process_pool, 1)?;
            leaf.set(ti, PtEntry::make_4k(frame, PageEntryBits::new_rw(ctx.user)));
            trace!("PTE {}: {frame}", ti.as_usize());

            if ctx.user && !pde.flags().user_access() {
                let mut flags = pde.flags();
                flags.set_user_access(true);
                directory.set(di, PdEntry::from_raw(flags.into_bits()));
                trace!("PDE {}: granted user access", di.as_usize());
            }

            FaultResolution::PageMapped { frame }
        } else {
            let leaf_frame = pools.get_frames(config.process_pool, 1)?;
            let frame = match pools.get_frames(config.process_pool, 1) {
                Ok(frame) => frame,
                Err(e) => {
                    pools.release_frames(leaf_frame)?;
                    error!("No frame left to back {address}: {e}");
                    return Err(e.into());
                }
            };

            let leaf: &mut LeafTable = match table_mut(mapper, leaf_frame) {
                Ok(leaf) => leaf,
                Err(e) => {
                    pools.release_frames(frame)?;
                    pools.release_frames(leaf_frame)?;
                    return Err(e);
                }
            };
            leaf.fill(PtEntry::absent(PageEntryBits::new_absent_user()));
            leaf.set(ti, PtEntry::make_4k(frame, PageEntryBits::new_rw(ctx.user)));
            directory.set(di, PdEntry::make_table(leaf_frame, PageEntryBits::new_rw(ctx.user)));
            trace!("PDE {}: leaf table {leaf_frame}", di.as_usize());
            trace!("PTE {}: {frame}", ti.as_usize());

            FaultResolution::LeafTableCreated {
                table: leaf_frame,
                frame,
            }
        };

        debug!(
            "Resolved fault at {address} ({}): {resolution:?}",
            if ctx.write { "write" } else { "read" }
        );
        Ok(resolution)
    }
}

/// Trap-path entry point.
///
/// Any error is fatal for the kernel: it is logged and the handler panics.
pub fn dispatch_fault<M: PhysMapper, U: Mmu>(
    paging: &mut Paging<'_, M, U>,
    address: VirtualAddress,
    error_code: u32,
) -> FaultResolution {
    let error = PageFaultError::from_bits(error_code);
    match paging.handle_fault(address, error) {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("PAGE FAULT: addr={address} err={error_code:#x} ({}): {e}", error.explain());
            panic!("unrecoverable page fault at {address}: {e}");
        }
    }
}

/// Read the faulting address from CR2.
///
/// # Safety
/// Must run in ring 0, inside the page-fault handler, before another fault
/// can overwrite CR2.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[must_use]
pub unsafe fn faulting_address() -> VirtualAddress {
    use kernel_registers::LoadRegisterUnsafe;
    use kernel_registers::cr2::Cr2;

    // SAFETY: Guaranteed by the caller.
    unsafe { Cr2::load_unsafe() }.fault_address()
}
