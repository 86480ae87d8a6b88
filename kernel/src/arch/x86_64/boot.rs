//! Bootloader handoff.
//!
//! `bootloader_api::entry_point!` generates the real `_start` and calls
//! `kernel_main` with a `&'static mut BootInfo` already in long mode, paging
//! enabled, and a stack set up. `BOOT_INFO` stashes the reference for the
//! few early subsystems (MSR helpers, panic handler) that need it before
//! `bootstrap::run` has threaded it through properly.

use bootloader_api::{config::Mapping, entry_point, BootInfo, BootloaderConfig};

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

/// Set once in `kernel_main`, before anything else runs. Read-only for the
/// remainder of boot (single-threaded, no concurrent writers).
pub static mut BOOT_INFO: Option<&'static BootInfo> = None;

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    crate::arch::x86_64::entry::arch_early_init();
    // SAFETY: single-threaded boot context; nothing else has run that could
    // race on this write.
    unsafe {
        BOOT_INFO = Some(&*boot_info);
    }
    crate::bootstrap::run(boot_info)
}
