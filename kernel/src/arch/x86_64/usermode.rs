//! The trampoline that returns control to a user process.
//!
//! `execute_next_process` (spec §4.4) calls [`enter_usermode`] after
//! switching CR3 to the target's PML4: it loads the saved general-purpose
//! registers, pushes an interrupt return frame built from the saved
//! `rip`/`rflags`/`rsp`, and executes `iretq`. This is also how a brand new
//! process (never before scheduled) starts running for the first time --
//! its `SavedRegisters` were built by `setup_initial_stack`/
//! `SavedRegisters::for_new_process` instead of being captured from a trap.

use super::context::SavedRegisters;
use super::gdt;

/// Load `regs` and transfer control to ring 3. Never returns.
///
/// # Safety
/// The caller must have already switched CR3 to the address space that
/// `regs.rip`/`regs.rsp` are valid in, and must have set the TSS RSP0 to
/// this process's kernel stack (`gdt::set_kernel_stack`) so the next trap
/// from ring 3 lands on a valid stack.
pub unsafe fn enter_usermode(regs: &SavedRegisters) -> ! {
    let selectors = gdt::selectors();
    // RPL 3 for both segments; SYSRET/IRETQ both require this in the low 2
    // bits of the selector.
    let user_cs = selectors.user_code_selector.0 as u64;
    let user_ss = selectors.user_data_selector.0 as u64;

    // SAFETY: builds a standard iretq frame (SS, RSP, RFLAGS, CS, RIP) on
    // the current (kernel) stack, then restores general-purpose registers
    // from `regs` before executing iretq. `regs` is a snapshot of a
    // previously-saved (or freshly initialized) process context; the
    // addresses it references are valid in the address space the caller
    // already switched to.
    // `rax` pins the pointer to `regs` for the whole sequence; it is the
    // last register loaded (from `[rax + 112]`) since that instruction
    // reads the old `rax` as its base address before overwriting it.
    unsafe {
        core::arch::asm!(
            "push {ss}",
            "push {rsp}",
            "push {rflags}",
            "push {cs}",
            "push {rip}",
            "mov r15, [rax + 0]",
            "mov r14, [rax + 8]",
            "mov r13, [rax + 16]",
            "mov r12, [rax + 24]",
            "mov r11, [rax + 32]",
            "mov r10, [rax + 40]",
            "mov r9,  [rax + 48]",
            "mov r8,  [rax + 56]",
            "mov rbp, [rax + 64]",
            "mov rdi, [rax + 72]",
            "mov rsi, [rax + 80]",
            "mov rdx, [rax + 88]",
            "mov rcx, [rax + 96]",
            "mov rbx, [rax + 104]",
            "mov rax, [rax + 112]",
            "iretq",
            in("rax") regs as *const SavedRegisters,
            ss = in(reg) user_ss,
            rsp = in(reg) regs.rsp,
            rflags = in(reg) regs.rflags,
            cs = in(reg) user_cs,
            rip = in(reg) regs.rip,
            options(noreturn)
        );
    }
}
