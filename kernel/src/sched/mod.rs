//! Cooperative round-robin process dispatcher (spec §4.4).
//!
//! A `Vec<ProcessId>` runqueue plus a cursor (`process::table`) stands in
//! for the singly-linked list the source describes; `execute_next_process`
//! advances it, switches to the target's address space, and jumps to user
//! mode via the saved-register trampoline.
//!
//! The PIT fires at 100 Hz and raises a pending-reschedule flag
//! (`timer_tick`); `arch::x86_64::timer::timer_trap` is the only place that
//! acts on it. That trap runs on a naked-asm trampoline (`timer::timer_entry`)
//! built to capture the interrupted process's complete general-purpose
//! register set into `SavedRegisters` before considering a switch, unlike a
//! plain `extern "x86-interrupt" fn`, which only exposes the `iretq` frame --
//! so it is the one safe place to preempt a process that is not otherwise
//! giving up control.
//!
//! `syscall::syscall_handler` never consults [`should_reschedule`]: an
//! ordinary syscall always returns to the process that issued it (only
//! `rax` changes, which the `syscall_entry`/`sysretq` path already carries
//! correctly without this module's help). The two syscalls that do leave a
//! process behind -- `exit` and `exec` -- call [`execute_next_process`]
//! directly, which is sound precisely because that process's registers no
//! longer matter: `exit` has freed the process, and `exec` has replaced it.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::x86_64::usermode::enter_usermode;
use crate::process::pcb::ProcessState;
use crate::process::{exit, table};

static RESCHED_PENDING: AtomicBool = AtomicBool::new(false);

pub fn init(pit_interval_ms: u32) {
    crate::arch::x86_64::timer::setup_timer(pit_interval_ms);
}

/// Called from the PIT IRQ handler (`arch::timer::tick`). Never blocks, never
/// touches the interrupted process's registers.
pub fn timer_tick() {
    RESCHED_PENDING.store(true, Ordering::Relaxed);
}

/// Consume the pending-reschedule flag. Only `arch::x86_64::timer::timer_trap`
/// calls this; `true` means it should save the interrupted process's state
/// and dispatch the next runqueue entry instead of resuming it.
pub fn should_reschedule() -> bool {
    RESCHED_PENDING.swap(false, Ordering::Relaxed)
}

/// Advance the runqueue cursor, reaping any zombie it passes over, and jump
/// to user mode in whatever process it lands on. Never returns: user mode is
/// only left again through a trap, and the only paths that reach here again
/// are `timer_trap` (when a reschedule is pending) and the `exit`/`exec`
/// syscalls (whose caller has nothing left to resume).
pub fn execute_next_process() -> ! {
    loop {
        let Some(pid) = table::advance() else {
            // Runqueue empty -- wait for one to appear (e.g. during boot,
            // before sysinit has been created).
            crate::arch::idle();
            continue;
        };

        let is_zombie = table::with_process(pid, |p| p.state == ProcessState::Zombie).unwrap_or(false);
        if is_zombie {
            let _ = exit::process_free(pid);
            continue;
        }

        let dispatched = table::with_process(pid, |p| {
            p.state = ProcessState::Running;
            p.space.switch();
            p.regs
        });

        if let Ok(regs) = dispatched {
            // SAFETY: `p.space.switch()` above just loaded this process's
            // CR3, so `regs` describes a valid context for the address
            // space currently active.
            unsafe { enter_usermode(&regs) };
        }
        // `with_process` only fails if the pid vanished between `advance`
        // and here, which cannot happen on a single CPU with no forced
        // preemption; loop defensively rather than assume it.
    }
}

/// Entry point for the idle kernel thread: dispatch forever.
pub fn run() -> ! {
    execute_next_process()
}
