//! Boot framebuffer video driver.
//!
//! Wraps the linear framebuffer the bootloader already set up. There is no
//! mode-setting or double buffering: `get_display_rect` reports the fixed
//! geometry, `create_framebuffer` hands back the framebuffer's physical
//! address and size for the caller to map into its own address space, and
//! `update_display` validates the presented rectangle against that geometry
//! (the surface itself is presented continuously once mapped, so there is
//! nothing left to do but reject an out-of-bounds rect).

use alloc::sync::Arc;

use crate::device::{Device, DeviceOps, DeviceType, DriverDescriptor, Rect};
use crate::error::{DevError, KernelError};
use crate::mm::bootloader::FramebufferInfo;
use crate::mm::PhysicalAddress;

struct VideoDevice {
    info: FramebufferInfo,
}

impl DeviceOps for VideoDevice {
    fn get_display_rect(&self) -> Result<Rect, KernelError> {
        Ok(Rect {
            x: 0,
            y: 0,
            width: self.info.width as u32,
            height: self.info.height as u32,
        })
    }

    fn create_framebuffer(&self, _rect: Rect) -> Result<(PhysicalAddress, usize), KernelError> {
        let size = self.info.stride * self.info.height * self.info.bytes_per_pixel;
        Ok((PhysicalAddress::new(self.info.phys_addr), size))
    }

    fn update_display(&self, rect: Rect) -> Result<(), KernelError> {
        let end_x = rect
            .x
            .checked_add(rect.width)
            .ok_or(KernelError::AccessDenied)?;
        let end_y = rect
            .y
            .checked_add(rect.height)
            .ok_or(KernelError::AccessDenied)?;
        if end_x > self.info.width as u32 || end_y > self.info.height as u32 {
            return Err(KernelError::AccessDenied);
        }
        Ok(())
    }
}

fn make_device(
    _bus: Option<&crate::device::pci_bus::BusDevice>,
    _ordinal: usize,
) -> Result<Device, KernelError> {
    let info = crate::mm::boot_framebuffer().ok_or(KernelError::from(DevError::NotFound))?;
    Ok(Device::new(
        DeviceType::Video,
        "boot-framebuffer",
        0,
        0,
        info.bytes_per_pixel as u32,
        (info.width * info.height) as u64,
        Arc::new(VideoDevice { info }),
    ))
}

pub fn register() {
    crate::device::register_driver(DriverDescriptor {
        name: "boot-framebuffer",
        bus_match: None,
        num_devices: 1,
        factory: make_device,
    });
}
