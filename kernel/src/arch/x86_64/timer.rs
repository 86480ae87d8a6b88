//! PIT timer: periodic interrupt source for the scheduler tick (spec §4.4,
//! "PIT at 100 Hz drives the scheduler tick").
//!
//! Unlike every other interrupt in `idt.rs`, the timer vector is installed
//! as a raw handler address rather than a typed `extern "x86-interrupt" fn`:
//! `execute_next_process` needs to save the *interrupted* process's full
//! general-purpose register set before potentially dispatching a different
//! one, and the `x86-interrupt` ABI doesn't expose those registers to Rust
//! code, only the `iretq` frame. `timer_entry` is a naked-asm trampoline in
//! the same style as `syscall::syscall_entry`, built to lay out the pushed
//! registers exactly as [`super::context::SavedRegisters`] so the saved
//! block can be read (or handed to the scheduler) without copying field by
//! field.

use x86_64::instructions::port::Port;

use super::context::SavedRegisters;

const PIC1_COMMAND: u16 = 0x20;

fn send_eoi() {
    // SAFETY: writing the EOI command to the master PIC's command port is
    // the documented 8259 acknowledgement sequence; IRQ0 never comes from
    // the slave PIC.
    unsafe {
        Port::<u8>::new(PIC1_COMMAND).write(0x20);
    }
}

/// Called from `timer_entry` with a pointer to the interrupted context's
/// full register snapshot. If a reschedule is due, the snapshot is saved
/// into the current process's record and control is handed to the
/// scheduler, which never returns here; otherwise this returns normally and
/// `timer_entry` resumes the interrupted process exactly as it found it.
#[no_mangle]
extern "C" fn timer_trap(regs: *mut SavedRegisters) {
    send_eoi();
    crate::arch::timer::tick();
    crate::sched::timer_tick();

    if crate::sched::should_reschedule() {
        if let Some(pid) = crate::process::table::current_pid() {
            // SAFETY: `regs` points at the live SavedRegisters block this
            // trap just built on its own kernel stack.
            let snapshot = unsafe { *regs };
            let _ = crate::process::table::with_process(pid, |p| {
                p.regs = snapshot;
                p.state = crate::process::ProcessState::Runnable;
            });
        }
        crate::sched::execute_next_process();
    }
}

/// `IRQ0` (PIT) entry point. Must only be installed as the timer vector's
/// raw handler address.
///
/// # Safety
/// Relies on being reached only via the IDT's interrupt-gate delivery for
/// the PIT vector, which has already pushed the standard `iretq` frame
/// (`rip`, `cs`, `rflags`, `rsp`, `ss`) before this runs.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn timer_entry() {
    core::arch::naked_asm!(
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "call {handler}",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "iretq",
        handler = sym timer_trap,
    );
}

/// Setup timer for periodic interrupts
pub fn setup_timer(interval_ms: u32) {
    // For now, we'll use the PIT (Programmable Interval Timer)
    // In a real implementation, we'd use the APIC timer

    const PIT_FREQUENCY: u32 = 1193182; // Hz
    let divisor = PIT_FREQUENCY / (1000 / interval_ms);

    unsafe {
        use x86_64::instructions::port::Port;

        // Command port
        let mut cmd_port: Port<u8> = Port::new(0x43);
        // Channel 0 data port
        let mut data_port: Port<u8> = Port::new(0x40);

        // Configure PIT channel 0 for periodic interrupts
        cmd_port.write(0x36); // Channel 0, lobyte/hibyte, rate generator

        // Set frequency divisor
        data_port.write((divisor & 0xFF) as u8);
        data_port.write((divisor >> 8) as u8);
    }

    println!("[TIMER] Configured PIT for {}ms intervals", interval_ms);
}
