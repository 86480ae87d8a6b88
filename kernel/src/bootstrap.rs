//! Boot sequence glue (spec §2's dependency order): arch bring-up, memory
//! management, device manager, VFS, kernel logging, scheduler, syscalls,
//! then fork+exec the initial user program.
//!
//! [`run`] is the one function `arch::x86_64::boot::kernel_main` calls; it
//! never returns -- the tail call into [`crate::sched::run`] hands control
//! to user mode and only traps ever come back into kernel code afterwards.

use bootloader_api::BootInfo;

use crate::{arch, device, drivers, fs, klog, mm, process, sched};

/// Run the full boot sequence and hand off to the scheduler. Never returns.
/// `arch::x86_64::entry::arch_early_init` has already run by the time this is
/// called -- `kernel_main` needs early serial up before it can even print
/// that `boot_info` arrived.
pub fn run(boot_info: &'static BootInfo) -> ! {
    println!("[BOOTSTRAP] Stage 1: architecture bring-up");
    arch::init();
    println!("[BOOTSTRAP] Architecture initialized");

    println!("[BOOTSTRAP] Stage 2: memory management");
    mm::init(boot_info);
    println!("[BOOTSTRAP] Memory management initialized");

    klog::init();
    log::info!("kernel log online");

    println!("[BOOTSTRAP] Stage 3: device manager");
    drivers::register_all();
    device::init_devices();
    log::info!("{} device(s) enumerated", device::device_count());

    println!("[BOOTSTRAP] Stage 4: virtual file system");
    fs::vfs_mount_filesystem(alloc::sync::Arc::new(fs::ramfs::RamFs::new()), "/")
        .expect("failed to mount root ramfs");
    fs::vfs_mount_filesystem(alloc::sync::Arc::new(fs::devfs::DevFs::new()), "/dev")
        .expect("failed to mount /dev");
    log::info!("root ramfs and devfs mounted");

    println!("[BOOTSTRAP] Stage 5: scheduler");
    sched::init(mm::boot_config().pit_interval_ms);
    arch::x86_64::syscall::init_syscall();
    log::info!("scheduler and syscall entry installed");

    println!("[BOOTSTRAP] Stage 6: initial user program");
    let pid = process::creation::process_create("/bin/sysinit", None, alloc::vec::Vec::new(), alloc::vec::Vec::new())
        .expect("0:/bin/sysinit is required and must be a valid ELF64 executable");
    log::info!("sysinit running as pid {}", pid);

    sched::run()
}
