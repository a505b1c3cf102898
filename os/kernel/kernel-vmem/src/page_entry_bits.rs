use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

/// A single 32-bit x86 paging entry in its raw bitfield form.
///
/// Directory entries (PDE) and leaf entries (PTE) share this layout; the
/// typed wrappers [`PdEntry`](crate::page_table::directory::PdEntry) and
/// [`PtEntry`](crate::page_table::leaf::PtEntry) decide which fields are
/// meaningful.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (leaf only) |
/// | 7     | `PS` / `PAT`    | 4 MiB page in a PDE, PAT in a PTE |
/// | 8     | `G`             | Global (leaf only) |
/// | 9–11  | OS avail        | Reserved for OS use |
/// | 12–31 | `frame`         | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::FrameNumber;
/// let e = PageEntryBits::new_kernel_rw().with_frame(FrameNumber::new(0x400));
/// assert_eq!(e.into_bits(), 0x0040_0003);
/// assert_eq!(e.frame(), FrameNumber::new(0x400));
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear means the CPU raises a page fault with error bit 0 clear on
    /// any access through this entry.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor only.
    /// Access is granted only if every entry on the walk allows it.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), leaf only. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a PDE; PAT in a PTE.
    ///
    /// 4 MiB pages are never used, so this is always written as 0.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    #[inline]
    pub const fn set_frame(&mut self, frame: FrameNumber) {
        self.set_frame_bits(frame.as_u32());
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.frame().base_address()
    }

    /// Present, writable, supervisor only (`0b011`).
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present and writable, user access as requested.
    #[inline]
    #[must_use]
    pub const fn new_rw(user: bool) -> Self {
        Self::new_kernel_rw().with_user_access(user)
    }

    /// Not present, but tagged user-accessible (`0b100`).
    ///
    /// Used for the slots of a freshly created leaf table.
    #[inline]
    #[must_use]
    pub const fn new_absent_user() -> Self {
        Self::new().with_user_access(true)
    }
}
