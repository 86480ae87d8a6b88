//! Virtual memory helpers layered on [`super::page_table::AddressSpace`].
//!
//! `AddressSpace` itself owns the per-page `map`/`unmap`/`translate`/`switch`
//! primitives; this module adds the one multi-page convenience the rest of
//! the kernel needs repeatedly: mapping N frames into a contiguous virtual
//! range in one call (used for the kernel heap window, a process's stack,
//! and each `PT_LOAD` segment), plus the user/kernel range checks the
//! syscall boundary and the video mapping syscalls need.

#![allow(dead_code)]

extern crate alloc;

use super::frame_allocator::{FrameNumber, FRAME_ALLOCATOR};
use super::page_table::AddressSpace;
pub use super::page_table::PageFlags;
use super::{PhysicalAddress, VirtualAddress};
use crate::error::KernelError;

/// Map `count` newly allocated, zeroed frames starting at `virt`, one frame
/// per page. Returns the allocated frames so the caller can track ownership
/// (e.g. a process's `data_pages`/`stack_pages`).
///
/// On allocation or mapping failure, frees whatever frames this call already
/// allocated before returning the error -- no partial range is left mapped
/// with frames the caller doesn't know it owns.
pub fn map_fresh_range(
    space: &AddressSpace,
    virt: VirtualAddress,
    count: usize,
    flags: PageFlags,
) -> Result<alloc::vec::Vec<FrameNumber>, KernelError> {
    let mut frames = alloc::vec::Vec::with_capacity(count);
    for i in 0..count {
        let result = crate::mm::alloc_frame().and_then(|frame| {
            let page_virt = virt.add(i * super::frame_allocator::FRAME_SIZE);
            space.map(page_virt, frame.as_addr(), flags).map(|_| frame)
        });
        match result {
            Ok(frame) => frames.push(frame),
            Err(e) => {
                unwind(&frames);
                return Err(e);
            }
        }
    }
    Ok(frames)
}

/// Map `count` consecutive *physical* frames starting at `phys` into `virt`
/// without allocating -- used for device-owned memory such as a mapped
/// framebuffer, where the physical pages already exist and are owned by the
/// device rather than the frame allocator.
pub fn map_fixed_range(
    space: &AddressSpace,
    virt: VirtualAddress,
    phys: PhysicalAddress,
    count: usize,
    flags: PageFlags,
) -> Result<(), KernelError> {
    for i in 0..count {
        let offset = i * super::frame_allocator::FRAME_SIZE;
        space.map(
            virt.add(offset),
            PhysicalAddress::new(phys.as_u64() + offset as u64),
            flags,
        )?;
    }
    Ok(())
}

fn unwind(frames: &[FrameNumber]) {
    for f in frames {
        let _ = FRAME_ALLOCATOR.free(*f);
    }
}

/// Whether the `len`-byte range starting at `virt` falls entirely within the
/// lower (user) canonical half -- entries 0..256 of the PML4, below
/// `0x0000_8000_0000_0000`.
pub fn is_user_range(virt: VirtualAddress, len: usize) -> bool {
    const USER_LIMIT: u64 = 0x0000_8000_0000_0000;
    let end = virt.as_u64().saturating_add(len as u64);
    virt.as_u64() < USER_LIMIT && end <= USER_LIMIT
}

/// Check that `count` consecutive pages starting at `virt` are entirely
/// unmapped in `space`. `video_create_framebuffer` (syscall 10) requires
/// this of its caller-supplied virtual address.
pub fn range_is_unmapped(space: &AddressSpace, virt: VirtualAddress, count: usize) -> bool {
    (0..count).all(|i| {
        space
            .translate(virt.add(i * super::frame_allocator::FRAME_SIZE))
            .is_none()
    })
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn user_range_rejects_kernel_half() {
        assert!(!is_user_range(
            VirtualAddress::new(0xffff_8000_0000_0000),
            4096
        ));
        assert!(is_user_range(VirtualAddress::new(0x0000_9000_0000), 4096));
    }
}
