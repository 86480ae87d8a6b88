//! 4-level x86_64 paging (PML4 -> PDPT -> PD -> PT).
//!
//! Every [`AddressSpace`] shares the kernel's upper half (entries 256..512,
//! i.e. the canonical-high half starting at `0xffff_8000_0000_0000`) so a
//! syscall or interrupt taken while a user PML4 is loaded still finds the
//! kernel mapped; only the lower half (256 entries, `0x0000_....` range) is
//! process-private.

#![allow(dead_code)]

extern crate alloc;

use core::sync::atomic::{AtomicU64, Ordering};

use alloc::collections::BTreeSet;
use bitflags::bitflags;

use super::frame_allocator::{FrameNumber, FRAME_ALLOCATOR};
use super::{PhysicalAddress, VirtualAddress};
use crate::error::{KernelError, MmError};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT    = 1 << 0;
        const WRITABLE   = 1 << 1;
        const USER       = 1 << 2;
        const NO_EXECUTE = 1 << 63;
    }
}

const ENTRIES: usize = 512;
const ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

/// Offset added to a physical address to reach its identity-mapped virtual
/// alias. Set once, early in boot, from `BootConfig::physical_memory_offset`.
static PHYS_OFFSET: AtomicU64 = AtomicU64::new(0);

pub fn set_physical_memory_offset(offset: u64) {
    PHYS_OFFSET.store(offset, Ordering::Relaxed);
}

fn phys_to_virt(phys: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(phys.as_u64() + PHYS_OFFSET.load(Ordering::Relaxed))
}

/// Public alias of [`phys_to_virt`] for callers outside this module that need
/// to write through a frame's direct-mapped alias (e.g. zeroing a freshly
/// allocated frame before it is mapped anywhere).
pub fn phys_to_virt_for_zeroing(phys: PhysicalAddress) -> VirtualAddress {
    phys_to_virt(phys)
}

#[repr(transparent)]
#[derive(Clone, Copy)]
struct Entry(u64);

impl Entry {
    const fn empty() -> Self {
        Self(0)
    }

    fn is_present(&self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    fn addr(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 & ADDR_MASK)
    }

    fn set(&mut self, addr: PhysicalAddress, flags: PageFlags) {
        self.0 = (addr.as_u64() & ADDR_MASK) | (flags | PageFlags::PRESENT).bits();
    }
}

#[repr(C, align(4096))]
struct Table {
    entries: [Entry; ENTRIES],
}

impl Table {
    fn zeroed() -> Self {
        Self {
            entries: [Entry::empty(); ENTRIES],
        }
    }
}

fn table_at(phys: PhysicalAddress) -> &'static mut Table {
    let virt = phys_to_virt(phys);
    // SAFETY: every table physical address stored in an Entry was produced by
    // `alloc_table`, which allocates exactly one zeroed, page-aligned frame
    // and never hands it out for any other purpose. The physical memory
    // offset direct-maps all of physical RAM, so this cast is valid and
    // uniquely owned while the containing AddressSpace is alive.
    unsafe { &mut *(virt.as_u64() as *mut Table) }
}

fn alloc_table() -> Result<PhysicalAddress, KernelError> {
    let frame = FRAME_ALLOCATOR.alloc()?;
    let addr = frame.as_addr();
    let table = table_at(addr);
    *table = Table::zeroed();
    Ok(addr)
}

fn indices(virt: VirtualAddress) -> [usize; 4] {
    let v = virt.as_u64();
    [
        ((v >> 39) & 0x1ff) as usize,
        ((v >> 30) & 0x1ff) as usize,
        ((v >> 21) & 0x1ff) as usize,
        ((v >> 12) & 0x1ff) as usize,
    ]
}

/// An owned PML4 (top-level page table) and the operations to map, unmap,
/// translate, and switch into it.
pub struct AddressSpace {
    pml4_phys: PhysicalAddress,
}

impl AddressSpace {
    /// Wrap an already-built PML4 (used to describe the kernel's own address
    /// space, built by the bootloader before `kmain` runs).
    pub fn from_existing(pml4_phys: PhysicalAddress) -> Self {
        Self { pml4_phys }
    }

    /// Wrap whatever PML4 is currently loaded in CR3.
    pub fn current() -> Self {
        Self::from_existing(crate::arch::x86_64::mmu::read_cr3())
    }

    /// Allocate a fresh PML4 whose upper half is shared with `kernel`.
    pub fn new_user(kernel: &AddressSpace) -> Result<Self, KernelError> {
        let pml4_phys = alloc_table()?;
        let new_table = table_at(pml4_phys);
        let kernel_table = table_at(kernel.pml4_phys);
        new_table.entries[256..].copy_from_slice(&kernel_table.entries[256..]);
        Ok(Self { pml4_phys })
    }

    pub fn phys_root(&self) -> PhysicalAddress {
        self.pml4_phys
    }

    /// Map one 4 KiB page. Allocates any missing intermediate tables.
    pub fn map(
        &self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), KernelError> {
        if virt.as_u64() % super::frame_allocator::FRAME_SIZE as u64 != 0
            || phys.as_u64() % super::frame_allocator::FRAME_SIZE as u64 != 0
        {
            return Err(MmError::InvalidAlignment.into());
        }
        let [i4, i3, i2, i1] = indices(virt);
        let pml4 = table_at(self.pml4_phys);
        let pdpt_phys = Self::next_level(pml4, i4, flags)?;
        let pdpt = table_at(pdpt_phys);
        let pd_phys = Self::next_level(pdpt, i3, flags)?;
        let pd = table_at(pd_phys);
        let pt_phys = Self::next_level(pd, i2, flags)?;
        let pt = table_at(pt_phys);
        pt.entries[i1].set(phys, flags);
        crate::arch::x86_64::mmu::invlpg(virt);
        Ok(())
    }

    fn next_level(
        table: &mut Table,
        index: usize,
        flags: PageFlags,
    ) -> Result<PhysicalAddress, KernelError> {
        let entry = &mut table.entries[index];
        if entry.is_present() {
            return Ok(entry.addr());
        }
        let child = alloc_table()?;
        // Intermediate tables are always present+writable(+user); leaf
        // permissions are what actually restrict the mapping.
        let mut parent_flags = PageFlags::WRITABLE;
        if flags.contains(PageFlags::USER) {
            parent_flags |= PageFlags::USER;
        }
        entry.set(child, parent_flags);
        Ok(child)
    }

    pub fn unmap(&self, virt: VirtualAddress) -> Result<PhysicalAddress, KernelError> {
        let [i4, i3, i2, i1] = indices(virt);
        let pml4 = table_at(self.pml4_phys);
        let e4 = pml4.entries[i4];
        if !e4.is_present() {
            return Err(MmError::Unmapped.into());
        }
        let pdpt = table_at(e4.addr());
        let e3 = pdpt.entries[i3];
        if !e3.is_present() {
            return Err(MmError::Unmapped.into());
        }
        let pd = table_at(e3.addr());
        let e2 = pd.entries[i2];
        if !e2.is_present() {
            return Err(MmError::Unmapped.into());
        }
        let pt = table_at(e2.addr());
        let e1 = pt.entries[i1];
        if !e1.is_present() {
            return Err(MmError::Unmapped.into());
        }
        let phys = e1.addr();
        pt.entries[i1] = Entry::empty();
        crate::arch::x86_64::mmu::invlpg(virt);
        Ok(phys)
    }

    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let [i4, i3, i2, i1] = indices(virt);
        let pml4 = table_at(self.pml4_phys);
        let e4 = pml4.entries[i4];
        if !e4.is_present() {
            return None;
        }
        let pdpt = table_at(e4.addr());
        let e3 = pdpt.entries[i3];
        if !e3.is_present() {
            return None;
        }
        let pd = table_at(e3.addr());
        let e2 = pd.entries[i2];
        if !e2.is_present() {
            return None;
        }
        let pt = table_at(e2.addr());
        let e1 = pt.entries[i1];
        if !e1.is_present() {
            return None;
        }
        let page_offset = virt.as_u64() & 0xfff;
        Some(PhysicalAddress::new(e1.addr().as_u64() + page_offset))
    }

    /// Load this address space's PML4 into CR3.
    pub fn switch(&self) {
        crate::arch::x86_64::mmu::write_cr3(self.pml4_phys);
    }

    /// Enumerate every present leaf mapping in the lower (user) half. Used
    /// by fork to copy a parent's pages into a child.
    pub fn user_mappings(&self) -> alloc::vec::Vec<(VirtualAddress, PhysicalAddress, PageFlags)> {
        let mut out = alloc::vec::Vec::new();
        let pml4 = table_at(self.pml4_phys);
        for i4 in 0..256 {
            let e4 = pml4.entries[i4];
            if !e4.is_present() {
                continue;
            }
            let pdpt = table_at(e4.addr());
            for i3 in 0..ENTRIES {
                let e3 = pdpt.entries[i3];
                if !e3.is_present() {
                    continue;
                }
                let pd = table_at(e3.addr());
                for i2 in 0..ENTRIES {
                    let e2 = pd.entries[i2];
                    if !e2.is_present() {
                        continue;
                    }
                    let pt = table_at(e2.addr());
                    for i1 in 0..ENTRIES {
                        let e1 = pt.entries[i1];
                        if !e1.is_present() {
                            continue;
                        }
                        let virt = ((i4 as u64) << 39)
                            | ((i3 as u64) << 30)
                            | ((i2 as u64) << 21)
                            | ((i1 as u64) << 12);
                        let flags = PageFlags::from_bits_truncate(e1.0) & !PageFlags::PRESENT;
                        out.push((VirtualAddress::new(virt), e1.addr(), flags));
                    }
                }
            }
        }
        out
    }

    /// Release every frame this address space owns in the user half: the
    /// PDPT/PD/PT frames `map`'s `next_level` allocated, any leaf frame not
    /// already in `known_leaves` (the caller's own `stack_pages`/
    /// `heap_pages`/`data_pages`, freed separately so it can track each
    /// frame by its logical role), and finally the PML4 frame itself.
    /// Spec §4.4: `process_free` "releases the PML4". Consumes `self` --
    /// this address space must never be switched into after this returns.
    pub fn teardown(self, known_leaves: &BTreeSet<u64>) {
        let pml4 = table_at(self.pml4_phys);
        for i4 in 0..256 {
            let e4 = pml4.entries[i4];
            if !e4.is_present() {
                continue;
            }
            let pdpt_phys = e4.addr();
            let pdpt = table_at(pdpt_phys);
            for i3 in 0..ENTRIES {
                let e3 = pdpt.entries[i3];
                if !e3.is_present() {
                    continue;
                }
                let pd_phys = e3.addr();
                let pd = table_at(pd_phys);
                for i2 in 0..ENTRIES {
                    let e2 = pd.entries[i2];
                    if !e2.is_present() {
                        continue;
                    }
                    let pt_phys = e2.addr();
                    let pt = table_at(pt_phys);
                    for i1 in 0..ENTRIES {
                        let e1 = pt.entries[i1];
                        if !e1.is_present() {
                            continue;
                        }
                        if !known_leaves.contains(&e1.addr().as_u64()) {
                            let _ = FRAME_ALLOCATOR.free(FrameNumber::from_addr(e1.addr()));
                        }
                    }
                    let _ = FRAME_ALLOCATOR.free(FrameNumber::from_addr(pt_phys));
                }
                let _ = FRAME_ALLOCATOR.free(FrameNumber::from_addr(pd_phys));
            }
            let _ = FRAME_ALLOCATOR.free(FrameNumber::from_addr(pdpt_phys));
        }
        let _ = FRAME_ALLOCATOR.free(FrameNumber::from_addr(self.pml4_phys));
    }
}
