//! Entropy source device.
//!
//! Prefers RDRAND when the CPU advertises it; otherwise falls back to
//! mixing timer jitter, via `arch::entropy`. Either way the caller gets
//! 32 bytes per call -- `randomize_buffer` rejects any other length rather
//! than silently truncating or repeating the block.

use alloc::sync::Arc;

use crate::arch::entropy;
use crate::device::{Device, DeviceOps, DeviceType, DriverDescriptor};
use crate::error::{DevError, KernelError};

struct RngDevice;

impl DeviceOps for RngDevice {
    fn randomize_buffer(&self, buf: &mut [u8]) -> Result<(), KernelError> {
        if buf.len() != 32 {
            return Err(KernelError::from(DevError::Unsupported));
        }
        let mut block = [0u8; 32];
        if !entropy::try_hardware_rng(&mut block) {
            entropy::collect_timer_entropy(&mut block);
        }
        buf.copy_from_slice(&block);
        Ok(())
    }
}

fn make_device(
    _bus: Option<&crate::device::pci_bus::BusDevice>,
    _ordinal: usize,
) -> Result<Device, KernelError> {
    Ok(Device::new(
        DeviceType::Rng,
        "entropy",
        0,
        0,
        0,
        0,
        Arc::new(RngDevice),
    ))
}

pub fn register() {
    crate::device::register_driver(DriverDescriptor {
        name: "entropy",
        bus_match: None,
        num_devices: 1,
        factory: make_device,
    });
}
