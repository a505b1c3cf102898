//! # Translation Hardware
//!
//! The paging code never touches control registers directly. It asks an
//! [`Mmu`] to switch the translation root or to turn paging on, which keeps
//! the whole memory core runnable on a development host.
//!
//! - [`X86Mmu`] (feature `asm`, 32-bit x86 only) writes CR3 and CR0.
//! - [`RecordingMmu`] only records what it was asked to do.

use alloc::vec::Vec;
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::cr3::Cr3;

/// Control over the platform's address translation.
pub trait Mmu {
    /// Make the page directory at `directory` the active translation root.
    ///
    /// Also discards every cached (non-global) translation.
    fn load_root(&mut self, directory: PhysicalAddress);

    /// Turn on address translation.
    fn enable_paging(&mut self);
}

/// A request received by a [`RecordingMmu`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MmuEvent {
    /// The CR3 value that would have been written.
    LoadRoot(Cr3),
    EnablePaging,
}

/// [`Mmu`] that performs nothing and remembers every request in order.
#[derive(Debug, Default)]
pub struct RecordingMmu {
    events: Vec<MmuEvent>,
}

impl RecordingMmu {
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[must_use]
    pub fn events(&self) -> &[MmuEvent] {
        &self.events
    }

    /// Directory of the most recent root load.
    #[must_use]
    pub fn root(&self) -> Option<PhysicalAddress> {
        self.events.iter().rev().find_map(|e| match e {
            MmuEvent::LoadRoot(cr3) => Some(cr3.directory()),
            MmuEvent::EnablePaging => None,
        })
    }

    /// Number of root loads so far.
    #[must_use]
    pub fn root_loads(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MmuEvent::LoadRoot(_)))
            .count()
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.events.contains(&MmuEvent::EnablePaging)
    }
}

impl Mmu for RecordingMmu {
    fn load_root(&mut self, directory: PhysicalAddress) {
        self.events.push(MmuEvent::LoadRoot(Cr3::from_directory(directory)));
    }

    fn enable_paging(&mut self) {
        self.events.push(MmuEvent::EnablePaging);
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use hardware::X86Mmu;

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod hardware {
    use super::Mmu;
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_registers::cr0::Cr0;
    use kernel_registers::cr3::Cr3;
    use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

    /// [`Mmu`] backed by the real CR0/CR3 registers.
    #[derive(Debug)]
    pub struct X86Mmu {
        _private: (),
    }

    impl X86Mmu {
        /// # Safety
        /// Must run in ring 0 in 32-bit protected mode. Whoever calls
        /// [`Mmu::load_root`] and [`Mmu::enable_paging`] through this value
        /// must ensure the running code stays mapped across the switch.
        #[must_use]
        pub const unsafe fn new() -> Self {
            Self { _private: () }
        }
    }

    impl Mmu for X86Mmu {
        fn load_root(&mut self, directory: PhysicalAddress) {
            // SAFETY: Ring 0 is guaranteed by `X86Mmu::new`.
            unsafe { Cr3::from_directory(directory).store_unsafe() }
        }

        fn enable_paging(&mut self) {
            // SAFETY: Ring 0 is guaranteed by `X86Mmu::new`.
            unsafe {
                let cr0 = Cr0::load_unsafe();
                cr0.with_paging_enabled().store_unsafe();
            }
        }
    }
}
