//! # Typed 32-bit x86 Paging Registers
//!
//! The paging core needs exactly three control registers:
//!
//! | Register | Role |
//! |----------|------|
//! | [`Cr0`](cr0::Cr0) | global paging switch (`PG`, bit 31) |
//! | [`Cr2`](cr2::Cr2) | linear address of the last page fault |
//! | [`Cr3`](cr3::Cr3) | physical base of the active page directory |
//!
//! The register layouts are always available so they can be built and
//! inspected in hosted tests; the raw `mov` accessors are compiled only with
//! the `asm` feature on a 32-bit x86 target.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cr0;
pub mod cr2;
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Control-register access is privileged and requires ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every subsequent memory access
    /// is translated.
    unsafe fn store_unsafe(self);
}
