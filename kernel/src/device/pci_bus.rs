//! Flat PCI configuration-space scan.
//!
//! Walks every bus/device/function the legacy CONFIG_ADDRESS/CONFIG_DATA I/O
//! ports (0xCF8/0xCFC) can see and returns the class/vendor/device identity
//! of anything that answers. No capability list walking, no MSI/MSI-X setup,
//! no BAR sizing -- the device manager only needs enough to match a driver's
//! `BusMatch` against.

use alloc::vec::Vec;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;

#[derive(Debug, Clone, Copy)]
pub struct BusDevice {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor: u16,
    pub device_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
}

fn config_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | ((device as u32) << 11)
        | ((function as u32) << 8)
        | (offset as u32 & 0xFC)
}

fn read_config_dword(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    // SAFETY: CONFIG_ADDRESS/CONFIG_DATA are the documented legacy PCI
    // mechanism #1 ports; writing a well-formed address then reading the
    // data port back is the standard access sequence.
    unsafe {
        crate::arch::x86_64::outl(CONFIG_ADDRESS, config_address(bus, device, function, offset));
        crate::arch::x86_64::inl(CONFIG_DATA)
    }
}

fn probe(bus: u8, device: u8, function: u8) -> Option<BusDevice> {
    let id = read_config_dword(bus, device, function, 0x00);
    let vendor = (id & 0xFFFF) as u16;
    if vendor == 0xFFFF {
        return None;
    }
    let device_id = (id >> 16) as u16;
    let class_reg = read_config_dword(bus, device, function, 0x08);
    Some(BusDevice {
        bus,
        device,
        function,
        vendor,
        device_id,
        class: (class_reg >> 24) as u8,
        subclass: (class_reg >> 16) as u8,
        prog_if: (class_reg >> 8) as u8,
    })
}

fn has_multiple_functions(bus: u8, device: u8) -> bool {
    let header_type = (read_config_dword(bus, device, 0, 0x0C) >> 16) as u8;
    header_type & 0x80 != 0
}

/// Scan every bus/device/function. Brute force (256 x 32 x 8), but this only
/// runs once at boot and each probe is a single port round trip.
pub fn scan() -> Vec<BusDevice> {
    let mut found = Vec::new();
    for bus in 0..=255u16 {
        let bus = bus as u8;
        for device in 0..32u8 {
            match probe(bus, device, 0) {
                None => continue,
                Some(dev0) => {
                    found.push(dev0);
                    if has_multiple_functions(bus, device) {
                        for function in 1..8u8 {
                            if let Some(dev) = probe(bus, device, function) {
                                found.push(dev);
                            }
                        }
                    }
                }
            }
        }
    }
    found
}
