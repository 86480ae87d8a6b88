//! Turns a `bootloader_api::BootInfo` into the frame allocator's usable
//! region list and a small owned [`BootConfig`] snapshot the rest of the
//! kernel can read without holding onto the (short-lived) `BootInfo`
//! reference.

#![allow(dead_code)]

use bootloader_api::info::{MemoryRegionKind, MemoryRegions};
use bootloader_api::BootInfo;

use super::frame_allocator::UsableRegion;

/// Framebuffer geometry snapshot, used by the video syscalls.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub phys_addr: u64,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub bytes_per_pixel: usize,
}

/// Everything the rest of the kernel needs from the bootloader handoff,
/// copied out of `BootInfo` once during early boot, plus the handful of
/// boot parameters (heap size, PIT frequency, early-log target) a real
/// Multiboot2 command line would carry. `bootloader_api`'s `BootInfo` has
/// no command-line field, so those three are filled in from compiled-in
/// defaults rather than parsed text; `klog_target` stays `None` until this
/// kernel boots under something that hands one over (see DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    pub physical_memory_offset: u64,
    pub kernel_image_phys_start: u64,
    pub kernel_image_phys_len: u64,
    pub framebuffer: Option<FramebufferInfo>,
    pub rsdp_addr: Option<u64>,
    /// Bytes to map for the kernel heap.
    pub heap_size: usize,
    /// PIT interval, in milliseconds, driving the scheduler tick.
    pub pit_interval_ms: u32,
    /// `klog=<vendor>:<device>`: select a PCI character device as the early
    /// log sink instead of the default serial console.
    pub klog_target: Option<(u16, u16)>,
}

impl BootConfig {
    /// Copy everything out of the bootloader's handoff struct. Heap size,
    /// PIT frequency, and the klog target have no carrier in `BootInfo`
    /// itself, so they come from the defaults below rather than `boot_info`.
    pub fn from_boot_info(boot_info: &BootInfo) -> Self {
        let framebuffer = boot_info.framebuffer.as_ref().map(|fb| {
            let info = fb.info();
            FramebufferInfo {
                phys_addr: 0, // filled in by `mm::init` once it can translate the mapping
                width: info.width,
                height: info.height,
                stride: info.stride,
                bytes_per_pixel: info.bytes_per_pixel,
            }
        });

        Self {
            physical_memory_offset: boot_info.physical_memory_offset.into_option().unwrap_or(0),
            kernel_image_phys_start: boot_info.kernel_addr,
            kernel_image_phys_len: boot_info.kernel_len,
            framebuffer,
            rsdp_addr: boot_info.rsdp_addr.into_option(),
            heap_size: super::heap::HEAP_SIZE,
            pit_interval_ms: 10,
            klog_target: None,
        }
    }
}

/// Build the PMM's usable-region list from the bootloader's memory map.
/// Regions shorter than one frame are dropped.
pub fn usable_regions(regions: &MemoryRegions) -> [UsableRegion; 64] {
    let mut out = [UsableRegion {
        start_frame: 0,
        frame_count: 0,
    }; 64];
    let mut i = 0;
    for region in regions.iter() {
        if region.kind != MemoryRegionKind::Usable {
            continue;
        }
        if i >= out.len() {
            break;
        }
        let start_frame = region.start / super::frame_allocator::FRAME_SIZE as u64;
        let end_frame = region.end / super::frame_allocator::FRAME_SIZE as u64;
        if end_frame <= start_frame {
            continue;
        }
        out[i] = UsableRegion {
            start_frame,
            frame_count: end_frame - start_frame,
        };
        i += 1;
    }
    out
}

/// Same as [`usable_regions`] but trimmed to the regions actually populated
/// (the fixed-size array above exists only because `init()` cannot allocate
/// yet).
pub fn usable_region_slice(regions: &MemoryRegions) -> (usize, [UsableRegion; 64]) {
    let all = usable_regions(regions);
    let count = all.iter().take_while(|r| r.frame_count != 0).count();
    (count, all)
}
