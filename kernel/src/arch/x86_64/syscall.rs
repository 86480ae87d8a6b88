//! `SYSCALL`/`SYSRET` fast entry path.
//!
//! The trampoline swaps to the per-CPU kernel stack via `swapgs` before
//! touching anything else, since at the instant `syscall_entry` starts
//! executing `rsp` is still whatever the user process had on ring 3 --
//! nothing on that stack is safe to trust or fault into.

#![allow(function_casts_as_integer)]

use crate::syscall::syscall_handler;

/// Per-CPU scratch slots the syscall trampoline addresses through `gs:`
/// after `swapgs`. `kernel_rsp` (offset 0) is the stack to switch onto;
/// `user_rsp_scratch` (offset 8) holds the interrupted user `rsp` for the
/// duration of the call.
#[repr(C)]
struct PerCpu {
    kernel_rsp: u64,
    user_rsp_scratch: u64,
    /// `rax` at entry (the syscall number), stashed here since it isn't one
    /// of the six SysV argument registers `syscall_handler` receives.
    syscall_num: u64,
}

impl PerCpu {
    const fn new() -> Self {
        Self {
            kernel_rsp: 0,
            user_rsp_scratch: 0,
            syscall_num: 0,
        }
    }
}

/// The syscall number stashed by the trampoline for the call currently in
/// flight. Only valid to read from inside `syscall_handler`.
pub fn current_syscall_number() -> u64 {
    // SAFETY: single-threaded kernel; read only while a syscall is being
    // handled, after the trampoline has written it and before the next one
    // overwrites it.
    #[allow(static_mut_refs)]
    unsafe {
        PERCPU.syscall_num
    }
}

static mut PERCPU: PerCpu = PerCpu::new();

/// Record the kernel stack the next `syscall` instruction should switch to.
/// Called by the scheduler on every dispatch, alongside
/// `gdt::set_kernel_stack` (which covers the interrupt/trap path; this
/// covers the `syscall` fast path).
pub fn set_syscall_kernel_stack(top: u64) {
    // SAFETY: single-threaded kernel; called with interrupts disabled from
    // the scheduler between dispatches, never concurrently with a syscall
    // in flight.
    #[allow(static_mut_refs)]
    unsafe {
        PERCPU.kernel_rsp = top;
    }
}

/// `SYSCALL` instruction entry point.
///
/// # Safety
/// Must only ever be installed as the `LSTAR` target; relies on the CPU's
/// `SYSCALL` semantics (return address in `rcx`, `rflags` in `r11`, ring 0
/// `CS`/`SS` already loaded from `STAR`).
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "swapgs",                   // gs now points at PerCpu
        "mov gs:[0x8], rsp",        // stash user rsp
        "mov rsp, gs:[0x0]",        // switch to this CPU's kernel stack
        "mov gs:[0x10], rax",       // stash syscall number

        "push rcx",                 // user rip (SYSCALL clobbers rcx with it)
        "push r11",                 // user rflags (SYSCALL clobbers r11 with it)
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",

        // ABI: rax = syscall number, rdi/rsi/rdx/r10/r8/r9 = args 1-6.
        // r10 carries arg4 (SYSCALL clobbers rcx), so shuffle it into rcx
        // to match the handler's ordinary System V signature.
        "mov rcx, r10",
        "call {handler}",

        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "pop r11",
        "pop rcx",

        "mov rsp, gs:[0x8]",        // restore user rsp
        "swapgs",                   // gs back to user's
        "sysretq",

        handler = sym syscall_handler
    );
}

/// Enable `SYSCALL`/`SYSRET` and point the CPU at [`syscall_entry`].
///
/// Must run once per CPU, after `gdt::init()` (STAR's selectors are read
/// from the live GDT) and before any user process can reach ring 3.
pub fn init_syscall() {
    use x86_64::registers::model_specific::{Efer, EferFlags, GsBase, KernelGsBase, LStar, SFMask, Star};
    use x86_64::registers::rflags::RFlags;
    use x86_64::VirtAddr;

    let selectors = super::gdt::selectors();

    // SAFETY: enables the SYSCALL/SYSRET extension and points it at a valid
    // entry point and GDT selectors computed from the GDT this CPU already
    // loaded in gdt::init().
    unsafe {
        Efer::update(|flags| {
            flags.insert(EferFlags::SYSTEM_CALL_EXTENSIONS);
        });

        LStar::write(VirtAddr::new(syscall_entry as usize as u64));

        // SYSCALL does not clear IF on its own; without this, a timer tick
        // could interrupt the trampoline before it finishes switching onto
        // the kernel stack (between the first `swapgs` and `mov rsp, ...`),
        // corrupting the per-CPU scratch slots. The bit is ANDed into
        // rflags at entry and the original is restored from r11 at
        // `sysretq`, so the syscall body still runs with interrupts enabled
        // once the handler re-enables them if it needs to.
        SFMask::write(RFlags::INTERRUPT_FLAG);

        // SYSRET requires cs_sysret.index() == ss_sysret.index() + 1 and
        // SYSCALL requires ss_syscall.index() == cs_syscall.index() + 1;
        // both hold given this GDT's layout (user_code = user_data + 8,
        // kernel_data = kernel_code + 8).
        Star::write(
            selectors.user_code_selector,
            selectors.user_data_selector,
            selectors.code_selector,
            selectors.data_selector,
        )
        .expect("GDT selector layout must satisfy SYSCALL/SYSRET invariants");

        // GS_BASE is swapgs's "current" slot (irrelevant here -- this
        // kernel never runs user code that reads %gs); KERNEL_GS_BASE is
        // swapped in on the trampoline's first `swapgs` and must point at
        // this CPU's `PerCpu`.
        GsBase::write(VirtAddr::new(0));
        #[allow(static_mut_refs)]
        KernelGsBase::write(VirtAddr::new(&raw const PERCPU as u64));
    }
}
