//! The process control block (spec §3/§4.4): everything needed to isolate,
//! schedule, and tear down one running program.

use alloc::string::String;
use alloc::vec::Vec;

use crate::arch::x86_64::context::SavedRegisters;
use crate::mm::frame_allocator::{FrameNumber, FRAME_SIZE};
use crate::mm::page_table::AddressSpace;
use crate::mm::VirtualAddress;
use crate::stream::DescriptorTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Created -> Runnable -> (Running <-> Runnable) -> Zombie -> Freed`.
/// `Zombie` is transient: set by `syscall_exit`, observed by the scheduler
/// on its next tick, at which point the record is actually removed from the
/// table (there is no stored `Freed` state -- it is absence from the
/// table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Runnable,
    Running,
    Zombie,
}

/// The unit of isolation (spec §3 "Process"). Owns its PML4, every physical
/// frame backing its stack/heap/data, and the 8-slot descriptor table.
pub struct Process {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub path: String,
    pub space: AddressSpace,
    /// Frames backing the fixed 3-page user stack, in order from
    /// `PROCESS_STACK_VADDR_BASE`.
    pub stack_pages: Vec<FrameNumber>,
    /// Frames handed out one at a time by the `alloc` syscall, in order
    /// from `USER_HEAP_VADDR_BASE`.
    pub heap_pages: Vec<FrameNumber>,
    /// Frames backing the ELF image's `PT_LOAD` segments, tagged with the
    /// virtual address each was mapped at (segments aren't contiguous, so
    /// fork's page-wise copy needs the address alongside the frame).
    pub data_pages: Vec<(VirtualAddress, FrameNumber)>,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    pub descriptors: DescriptorTable,
    pub regs: SavedRegisters,
    pub state: ProcessState,
}

impl Process {
    pub fn stack_top(&self) -> u64 {
        super::PROCESS_STACK_VADDR_BASE + (self.stack_pages.len() as u64 * FRAME_SIZE as u64)
    }

    /// Virtual addresses of `stack_pages`, in allocation order. Stack pages
    /// aren't tracked alongside their address the way `data_pages` are,
    /// since they always start at the fixed `PROCESS_STACK_VADDR_BASE`.
    pub fn stack_pages_with_addrs(&self) -> Vec<VirtualAddress> {
        (0..self.stack_pages.len())
            .map(|i| VirtualAddress::new(super::PROCESS_STACK_VADDR_BASE + i as u64 * FRAME_SIZE as u64))
            .collect()
    }

    /// Virtual addresses of `heap_pages`, in allocation order from
    /// `USER_HEAP_VADDR_BASE`.
    pub fn heap_pages_with_addrs(&self) -> Vec<VirtualAddress> {
        (0..self.heap_pages.len())
            .map(|i| VirtualAddress::new(super::USER_HEAP_VADDR_BASE + i as u64 * FRAME_SIZE as u64))
            .collect()
    }
}
