//! QEMU's `isa-debug-exit`-adjacent 0xE9 debug port: a `char` device that
//! writes straight out an I/O port with no handshake, no IRQ, and no status
//! register to poll. Real hardware simply ignores the port, so this is safe
//! to probe and write unconditionally -- `klog` uses it as a second sink
//! alongside the serial console rather than a replacement for it.

use alloc::sync::Arc;

use crate::device::{Device, DeviceOps, DeviceType, DriverDescriptor};
use crate::error::KernelError;

const PORT: u16 = 0xE9;

pub fn write_byte(byte: u8) {
    // SAFETY: port 0xE9 has no side effects to guard against -- QEMU's
    // debug-console device reads it as a byte sink, and hardware lacking
    // that device simply drops the write.
    unsafe {
        crate::arch::outb(PORT, byte);
    }
}

pub fn write_str(s: &str) {
    for b in s.bytes() {
        write_byte(b);
    }
}

struct E9Device;

impl DeviceOps for E9Device {
    fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        for &b in buf {
            write_byte(b);
        }
        Ok(buf.len())
    }
}

fn make_device(
    _bus: Option<&crate::device::pci_bus::BusDevice>,
    _ordinal: usize,
) -> Result<Device, KernelError> {
    Ok(Device::new(DeviceType::Char, "e9-debug-console", 0, 0, 0, 0, Arc::new(E9Device)))
}

pub fn register() {
    crate::device::register_driver(DriverDescriptor {
        name: "e9-debug-console",
        bus_match: None,
        num_devices: 1,
        factory: make_device,
    });
}
