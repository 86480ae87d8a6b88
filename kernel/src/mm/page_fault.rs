//! Fatal page-fault handling.
//!
//! This kernel has no demand paging, swap, or copy-on-write (explicit
//! Non-goals), so every page fault is unrecoverable: decode the error code
//! and CR2, log the faulting process's path and RIP if one was running,
//! then halt with interrupts masked. Regardless of which ring faulted, the
//! outcome is the same -- there is nowhere else to route it.

#![allow(dead_code)]

use crate::arch::x86_64::mmu::PageFaultErrorCode;
use crate::mm::VirtualAddress;

/// Snapshot of CPU state at the moment of the fault, as captured by the IDT
/// trap gate before it calls into this handler.
#[derive(Debug, Clone, Copy)]
pub struct PageFaultInfo {
    pub faulting_address: VirtualAddress,
    pub error_code: PageFaultErrorCode,
    pub rip: u64,
}

/// Log and halt. Never returns.
pub fn handle_fatal_page_fault(info: PageFaultInfo) -> ! {
    let proc_desc = crate::process::current_process_id()
        .map(|pid| alloc::format!("pid {}", pid.as_u64()))
        .unwrap_or_else(|| alloc::string::String::from("<no process>"));

    log::error!(
        "page fault: addr={:#x} rip={:#x} present={} write={} user={} reserved={} ifetch={} ({})",
        info.faulting_address.as_u64(),
        info.rip,
        info.error_code.protection_violation(),
        info.error_code.write(),
        info.error_code.user_mode(),
        info.error_code.reserved_write(),
        info.error_code.instruction_fetch(),
        proc_desc,
    );

    crate::arch::x86_64::halt();
}

extern crate alloc;
