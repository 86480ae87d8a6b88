//! Saved user-mode register state.
//!
//! One [`SavedRegisters`] lives in each [`crate::process::Process`]. It is
//! filled in by the syscall/timer trap entry before the scheduler or syscall
//! handler runs, and consumed by the usermode trampoline (`usermode.rs`)
//! when that process is dispatched again.

#![allow(dead_code)]

/// General-purpose register snapshot. Field order matches the push order in
/// the naked-asm trampolines in `usermode.rs` and `syscall.rs`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SavedRegisters {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// Instruction pointer to resume at.
    pub rip: u64,
    /// User stack pointer.
    pub rsp: u64,
    /// RFLAGS at the time of the trap.
    pub rflags: u64,
}

impl SavedRegisters {
    pub const fn empty() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: 0,
            rsp: 0,
            rflags: 0x202, // IF set, reserved bit 1 set
        }
    }

    /// Set up registers for a brand new process: entry point and top of
    /// stack (spec §4.4 step 8).
    pub fn for_new_process(entry: u64, stack_top: u64) -> Self {
        let mut regs = Self::empty();
        regs.rip = entry;
        regs.rsp = stack_top;
        regs
    }

    pub fn set_syscall_return(&mut self, value: i64) {
        self.rax = value as u64;
    }

    /// `setup_initial_stack` (spec §4.4): argc/argv/envc/envp go in
    /// rdi/rsi/rdx/rcx per this kernel's ABI.
    pub fn set_abi_args(&mut self, argc: u64, argv: u64, envc: u64, envp: u64) {
        self.rdi = argc;
        self.rsi = argv;
        self.rdx = envc;
        self.rcx = envp;
    }
}
