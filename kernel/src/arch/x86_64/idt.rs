//! Interrupt Descriptor Table: CPU exceptions (vectors 0-31) as trap gates,
//! legacy PIC IRQs (vectors 32-47) as interrupt gates.
//!
//! Every exception other than breakpoint is fatal -- this kernel has no
//! demand paging, signal delivery, or any other way to resume a faulted
//! context, so each handler dumps what it can and halts. Page faults get a
//! dedicated path (`mm::page_fault`) since they carry a faulting address and
//! are the one exception expected to happen during normal operation (a bad
//! user pointer, not just kernel bugs).

use lazy_static::lazy_static;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::arch::x86_64::mmu::PageFaultErrorCode as KernelPageFaultErrorCode;
use crate::mm::page_fault::{handle_fatal_page_fault, PageFaultInfo};
use crate::mm::VirtualAddress;

const PIC1_COMMAND: u16 = 0x20;
const PIC2_COMMAND: u16 = 0xA0;
const TIMER_VECTOR: u8 = 32;
const KEYBOARD_VECTOR: u8 = 33;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(fatal_divide_error);
        idt.debug.set_handler_fn(fatal_debug);
        idt.non_maskable_interrupt.set_handler_fn(fatal_nmi);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(fatal_overflow);
        idt.bound_range_exceeded.set_handler_fn(fatal_bound_range);
        idt.invalid_opcode.set_handler_fn(fatal_invalid_opcode);
        idt.device_not_available
            .set_handler_fn(fatal_device_not_available);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(fatal_invalid_tss);
        idt.segment_not_present
            .set_handler_fn(fatal_segment_not_present);
        idt.stack_segment_fault
            .set_handler_fn(fatal_stack_segment_fault);
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.x87_floating_point.set_handler_fn(fatal_x87);
        idt.alignment_check.set_handler_fn(fatal_alignment_check);
        unsafe {
            idt.machine_check.set_handler_fn(fatal_machine_check);
        }
        idt.simd_floating_point.set_handler_fn(fatal_simd);
        idt.virtualization.set_handler_fn(fatal_virtualization);
        idt.security_exception
            .set_handler_fn(fatal_security_exception);

        // The timer vector alone bypasses `set_handler_fn`: the scheduler
        // needs the interrupted context's full GPR set, which the
        // `x86-interrupt` ABI doesn't expose, so `timer::timer_entry` is a
        // naked-asm trampoline installed by raw address instead.
        unsafe {
            idt[TIMER_VECTOR as usize]
                .set_handler_addr(x86_64::VirtAddr::new(crate::arch::x86_64::timer::timer_entry as usize as u64));
        }
        idt[KEYBOARD_VECTOR as usize].set_handler_fn(keyboard_interrupt_handler);

        idt
    };
}

pub fn init() {
    IDT.load();
}

/// Acknowledge an IRQ. `vector` must be the IDT vector (32-47), not the IRQ
/// line; IRQs 8-15 (vector >= 40) also need the slave PIC acknowledged.
fn send_eoi(vector: u8) {
    // SAFETY: writing the EOI command (0x20) to the PIC command port is the
    // documented 8259 acknowledgement sequence.
    unsafe {
        if vector >= 40 {
            Port::<u8>::new(PIC2_COMMAND).write(0x20);
        }
        Port::<u8>::new(PIC1_COMMAND).write(0x20);
    }
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("breakpoint at rip={:#x}", stack_frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    log::error!("double fault\n{:#?}", stack_frame);
    crate::arch::x86_64::halt();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let cr2 = crate::arch::x86_64::mmu::read_cr2();
    handle_fatal_page_fault(PageFaultInfo {
        faulting_address: VirtualAddress::new(cr2.as_u64()),
        error_code: KernelPageFaultErrorCode::from_bits(error_code.bits() as u32),
        rip: stack_frame.instruction_pointer.as_u64(),
    });
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!(
        "general protection fault, selector={:#x}\n{:#?}",
        error_code,
        stack_frame
    );
    crate::arch::x86_64::halt();
}

macro_rules! fatal_exception {
    ($name:ident, $msg:literal) => {
        extern "x86-interrupt" fn $name(stack_frame: InterruptStackFrame) {
            log::error!(concat!($msg, "\n{:#?}"), stack_frame);
            crate::arch::x86_64::halt();
        }
    };
    ($name:ident, $msg:literal, with_error_code) => {
        extern "x86-interrupt" fn $name(stack_frame: InterruptStackFrame, error_code: u64) {
            log::error!(concat!($msg, " (error={:#x})\n{:#?}"), error_code, stack_frame);
            crate::arch::x86_64::halt();
        }
    };
}

fatal_exception!(fatal_divide_error, "divide error");
fatal_exception!(fatal_debug, "debug exception");
fatal_exception!(fatal_nmi, "non-maskable interrupt");
fatal_exception!(fatal_overflow, "overflow");
fatal_exception!(fatal_bound_range, "bound range exceeded");
fatal_exception!(fatal_invalid_opcode, "invalid opcode");
fatal_exception!(fatal_device_not_available, "device not available");
fatal_exception!(fatal_invalid_tss, "invalid TSS", with_error_code);
fatal_exception!(fatal_segment_not_present, "segment not present", with_error_code);
fatal_exception!(fatal_stack_segment_fault, "stack segment fault", with_error_code);
fatal_exception!(fatal_x87, "x87 floating point exception");
fatal_exception!(fatal_alignment_check, "alignment check", with_error_code);
fatal_exception!(fatal_simd, "SIMD floating point exception");
fatal_exception!(fatal_virtualization, "virtualization exception");
fatal_exception!(fatal_security_exception, "security exception", with_error_code);

extern "x86-interrupt" fn fatal_machine_check(stack_frame: InterruptStackFrame) -> ! {
    log::error!("machine check\n{:#?}", stack_frame);
    crate::arch::x86_64::halt();
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    // SAFETY: reading the PS/2 data port (0x60) is the documented way to
    // drain the scancode that triggered this IRQ.
    let scancode: u8 = unsafe { Port::new(0x60).read() };
    crate::drivers::keyboard::handle_scancode(scancode);
    send_eoi(KEYBOARD_VECTOR);
}
