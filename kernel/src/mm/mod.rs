//! Memory management: physical frames, paging, and the kernel heap.
//!
//! [`PhysicalAddress`]/[`VirtualAddress`] are the canonical address newtypes
//! every other mm submodule (and `elf`, `process`) builds on. [`init`] wires
//! the bootloader's memory map into the frame allocator, records the
//! physical-memory direct-map offset the page table walker needs, and maps
//! + activates the kernel heap.

#![allow(dead_code)]

pub mod bootloader;
pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;
pub mod user_validation;
pub mod vmm;

pub use page_table::PageFlags;

use bootloader_api::BootInfo;

use crate::error::KernelError;
use crate::sync::once_lock::GlobalState;
use bootloader::{BootConfig, FramebufferInfo};
use frame_allocator::{FrameNumber, FRAME_ALLOCATOR};
use page_table::AddressSpace;

/// Physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }
}

/// Allocate one physical frame from the global frame allocator.
///
/// Thin wrapper so callers (`vmm::map_fresh_range`, the process loader)
/// go through one call site instead of reaching for `frame_allocator::
/// FRAME_ALLOCATOR` directly.
pub fn alloc_frame() -> Result<FrameNumber, KernelError> {
    FRAME_ALLOCATOR.alloc()
}

pub fn free_frame(frame: FrameNumber) -> Result<(), KernelError> {
    FRAME_ALLOCATOR.free(frame)
}

/// The kernel's own address space, as built by the bootloader before
/// `kernel_main` ran. Captured once in [`init`]; every user [`AddressSpace`]
/// is created by copying this one's upper half.
static KERNEL_ADDRESS_SPACE: GlobalState<AddressSpace> = GlobalState::new();

pub fn kernel_address_space() -> &'static AddressSpace {
    KERNEL_ADDRESS_SPACE
        .get()
        .expect("mm::init must run before kernel_address_space is used")
}

/// Framebuffer geometry/physical address, captured once at boot for the
/// video device driver. `None` if the bootloader didn't hand one over.
static BOOT_FRAMEBUFFER: GlobalState<Option<FramebufferInfo>> = GlobalState::new();

pub fn boot_framebuffer() -> Option<FramebufferInfo> {
    *BOOT_FRAMEBUFFER.get().unwrap_or(&None)
}

/// The boot-time configuration snapshot (heap size, PIT interval, klog
/// target, ...), captured once in [`init`]. See [`bootloader::BootConfig`].
static BOOT_CONFIG: GlobalState<BootConfig> = GlobalState::new();

pub fn boot_config() -> &'static BootConfig {
    BOOT_CONFIG
        .get()
        .expect("mm::init must run before boot_config is used")
}

/// Bring up the physical frame allocator, the physical-memory direct-map
/// offset, and the kernel heap. Must run exactly once, early in boot,
/// before any code allocates or maps a page.
pub fn init(boot_info: &'static BootInfo) {
    let (count, regions) = bootloader::usable_region_slice(&boot_info.memory_regions);
    FRAME_ALLOCATOR.init(&regions[..count]);

    let phys_offset = boot_info
        .physical_memory_offset
        .into_option()
        .expect("bootloader must report a physical memory offset (Mapping::Dynamic)");
    page_table::set_physical_memory_offset(phys_offset);

    let kernel_space = AddressSpace::current();

    let flags = PageFlags::PRESENT | PageFlags::WRITABLE;
    vmm::map_fresh_range(
        &kernel_space,
        VirtualAddress::new(heap::HEAP_START as u64),
        heap::HEAP_SIZE / frame_allocator::FRAME_SIZE,
        flags,
    )
    .expect("failed to map kernel heap range");

    #[cfg(target_os = "none")]
    // SAFETY: the range just mapped above is freshly allocated, writable,
    // and not aliased by anything else; this runs exactly once.
    unsafe {
        crate::ALLOCATOR.init(heap::HEAP_START, heap::HEAP_SIZE);
    }

    let fb_info = boot_info.framebuffer.as_ref().and_then(|fb| {
        let info = fb.info();
        let virt = VirtualAddress::new(fb.buffer().as_ptr() as u64);
        kernel_space
            .translate(virt)
            .map(|phys| FramebufferInfo {
                phys_addr: phys.as_u64(),
                width: info.width,
                height: info.height,
                stride: info.stride,
                bytes_per_pixel: info.bytes_per_pixel,
            })
    });
    let _ = BOOT_FRAMEBUFFER.init(fb_info);

    let mut config = BootConfig::from_boot_info(boot_info);
    config.framebuffer = fb_info;
    let _ = BOOT_CONFIG.init(config);

    let _ = KERNEL_ADDRESS_SPACE.init(kernel_space);
}
