//! Hydra Kernel Library
//!
//! Core kernel library: physical/virtual memory management, the process
//! and scheduler model, the stream/VFS layer, the device manager, and the
//! syscall boundary. Exported as a library so the bare-metal binary
//! (`main.rs`) and the `tests/` integration harness can both link against
//! it.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

extern crate alloc;

// On bare metal the kernel heap (mm::heap) is the global allocator. On the
// host target (used for `cargo test` of individual modules) we delegate to
// the system allocator so Vec/String/alloc-using unit tests compile and run
// without a hand-rolled heap.
#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: mm::heap::LockedBuddyHeap = mm::heap::LockedBuddyHeap::empty();

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

mod intrinsics;

pub mod arch;
pub mod bootstrap;
pub mod device;
pub mod drivers;
pub mod elf;
pub mod error;
pub mod fs;
pub mod klog;
pub mod mm;
pub mod process;
pub mod sched;
pub mod serial;
pub mod stream;
pub mod sync;
pub mod syscall;
pub mod test_framework;

pub use test_framework::{
    cycles_to_ns, exit_qemu, read_timestamp, test_panic_handler, BenchmarkRunner, QemuExitCode,
    Testable,
};

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    klog::panic(info)
}

/// Heap allocation error handler.
///
/// Panic is intentional: heap allocation failure in a no_std kernel is
/// unrecoverable. The alloc_error_handler ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

#[cfg(test)]
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}
