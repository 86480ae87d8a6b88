//! The three video syscalls (spec §4.8): query the display geometry, carve
//! out a framebuffer mapping, and present it. These go straight to
//! `device::with_device` rather than through [`crate::device::DeviceHandle`]
//! (which only wraps the generic `read`/`write` ops), since
//! `get_display_rect`/`create_framebuffer`/`update_display` are video-only
//! `DeviceOps` methods with no stream-layer equivalent.

use crate::device::{self, DeviceType, Rect};
use crate::error::{DevError, KernelError};
use crate::mm::page_table::PageFlags;
use crate::mm::user_validation::{copy_to_user, validate_user_buffer};
use crate::mm::vmm::{is_user_range, map_fixed_range, range_is_unmapped};
use crate::mm::{frame_allocator::FRAME_SIZE, VirtualAddress};
use crate::process::{table, ProcessId};

/// The only window a caller-supplied framebuffer target may land in (spec
/// §4.8): `[0x900000, 0x1000000)`.
const FRAMEBUFFER_WINDOW_START: u64 = 0x0090_0000;
const FRAMEBUFFER_WINDOW_END: u64 = 0x0100_0000;

fn video_device(display: u64) -> Result<usize, KernelError> {
    device::find_by_type_index(DeviceType::Video, display as usize).ok_or(DevError::NotFound.into())
}

/// `video_get_display_rect(display, out_rect)`: write the current display
/// geometry (four little-endian `u32`s: x, y, width, height) to `out_rect`.
pub fn sys_video_get_display_rect(
    pid: ProcessId,
    display: u64,
    out_rect: u64,
    _: u64,
    _: u64,
    _: u64,
) -> Result<i64, KernelError> {
    let idx = video_device(display)?;
    let rect = device::with_device(idx, |d| d.ops().get_display_rect())
        .ok_or(KernelError::from(DevError::NotFound))??;

    table::with_process(pid, |p| {
        let addr = VirtualAddress::new(out_rect);
        validate_user_buffer(&p.space, addr, 16)?;
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&rect.x.to_le_bytes());
        bytes[4..8].copy_from_slice(&rect.y.to_le_bytes());
        bytes[8..12].copy_from_slice(&rect.width.to_le_bytes());
        bytes[12..16].copy_from_slice(&rect.height.to_le_bytes());
        copy_to_user(&p.space, addr, &bytes)?;
        Ok(0)
    })?
}

/// `video_create_framebuffer(display, x, y, width, height, vaddr)`: ask the
/// video device to carve out a framebuffer for a rectangle of the given
/// geometry, then map the physical memory it returns at the caller-supplied
/// `vaddr`, which must fall entirely in `[0x900000, 0x1000000)` and be
/// currently unmapped in the caller's own address space.
///
/// The six raw syscall argument slots aren't enough for `display` plus a
/// four-field `Rect` plus `vaddr` (six values already, with no room for the
/// process-control `pid` the dispatcher always threads through separately),
/// so the rectangle's `x`/`y` are packed into `a2` (two `u32` halves) and
/// width/height into `a3`, leaving `a4` for `vaddr`.
pub fn sys_video_create_framebuffer(
    pid: ProcessId,
    display: u64,
    xy: u64,
    wh: u64,
    vaddr: u64,
    _: u64,
) -> Result<i64, KernelError> {
    let idx = video_device(display)?;
    let rect = Rect {
        x: (xy & 0xffff_ffff) as u32,
        y: (xy >> 32) as u32,
        width: (wh & 0xffff_ffff) as u32,
        height: (wh >> 32) as u32,
    };

    let (phys, size) = device::with_device(idx, |d| d.ops().create_framebuffer(rect))
        .ok_or(KernelError::from(DevError::NotFound))??;

    let page_count = size.div_ceil(FRAME_SIZE);
    let target = VirtualAddress::new(vaddr);

    let target_end = target.as_u64().checked_add((page_count * FRAME_SIZE) as u64).ok_or(KernelError::AccessDenied)?;
    if target.as_u64() < FRAMEBUFFER_WINDOW_START || target_end > FRAMEBUFFER_WINDOW_END {
        return Err(KernelError::AccessDenied);
    }

    table::with_process(pid, |p| {
        if !is_user_range(target, page_count * FRAME_SIZE) || !range_is_unmapped(&p.space, target, page_count) {
            return Err(KernelError::AccessDenied);
        }
        map_fixed_range(
            &p.space,
            target,
            phys,
            page_count,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
        )?;
        Ok(size as i64)
    })?
}

/// `video_update_display(display, x, y, width, height)`: present the region
/// described by the packed rectangle. Same `a2`/`a3` packing as
/// `video_create_framebuffer`.
pub fn sys_video_update_display(
    _pid: ProcessId,
    display: u64,
    xy: u64,
    wh: u64,
    _: u64,
    _: u64,
) -> Result<i64, KernelError> {
    let idx = video_device(display)?;
    let rect = Rect {
        x: (xy & 0xffff_ffff) as u32,
        y: (xy >> 32) as u32,
        width: (wh & 0xffff_ffff) as u32,
        height: (wh >> 32) as u32,
    };
    device::with_device(idx, |d| d.ops().update_display(rect)).ok_or(KernelError::from(DevError::NotFound))??;
    Ok(0)
}
