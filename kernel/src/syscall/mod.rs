//! The system call interface (spec §4.8): a flat, indexed table of 14 calls,
//! entered through `syscall_handler` from the `syscall`/`sysret` trampoline
//! in `arch::x86_64::syscall`.
//!
//! Every call has the same raw shape -- six `u64` arguments, one `i64`
//! return -- whatever its real arity; entries that need fewer just ignore
//! the trailing ones. [`SYSCALL_TABLE`] is indexed directly by syscall
//! number rather than matched in a `match`/`switch`, mirroring
//! [`crate::device::with_device`]'s and `irq::IrqManager`'s handler-table
//! shape elsewhere in this kernel.
//!
//! A table entry returns `Result<i64, KernelError>`; [`syscall_handler`] is
//! the single place that collapses an `Err` to the ABI's negative-integer
//! taxonomy via [`KernelError::to_syscall_return`]. `exit` and `exec` never
//! actually produce a value here -- both end by calling
//! [`crate::sched::execute_next_process`], whose `!` return type coerces to
//! `Result<i64, KernelError>` at the call site like any other divergent tail
//! call.

mod io;
mod proc;
mod video;

use crate::error::{KernelError, SyscallError};
use crate::process::ProcessId;

type SyscallFn = fn(ProcessId, u64, u64, u64, u64, u64) -> Result<i64, KernelError>;

const SYSCALL_TABLE: [SyscallFn; 14] = [
    io::sys_read,                         // 0
    io::sys_write,                        // 1
    proc::sys_fork,                       // 2
    proc::sys_exit,                       // 3
    proc::sys_ping,                       // 4
    proc::sys_exec,                       // 5
    proc::sys_alloc,                      // 6
    io::sys_open,                         // 7
    io::sys_close,                        // 8
    video::sys_video_get_display_rect,    // 9
    video::sys_video_create_framebuffer,  // 10
    video::sys_video_update_display,      // 11
    io::sys_pipe,                         // 12
    io::sys_lseek,                        // 13
];

/// Entry point called from [`crate::arch::x86_64::syscall::syscall_entry`]'s
/// naked-asm trampoline. The six arguments are already in the System V
/// registers the trampoline built (`rdi`/`rsi`/`rdx`/`rcx`/`r8`/`r9`, `r10`
/// having been shuffled into `rcx`); the syscall number itself travels
/// out-of-band through `current_syscall_number` since `rax` isn't one of the
/// six argument registers.
#[no_mangle]
extern "C" fn syscall_handler(a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64) -> i64 {
    let num = crate::arch::x86_64::syscall::current_syscall_number();

    let Some(pid) = crate::process::current_process_id() else {
        return KernelError::from(SyscallError::InvalidArgument).to_syscall_return();
    };

    let Some(handler) = SYSCALL_TABLE.get(num as usize) else {
        return KernelError::from(SyscallError::InvalidSyscall).to_syscall_return();
    };

    handler(pid, a1, a2, a3, a4, a5).unwrap_or_else(|e| e.to_syscall_return())
}
