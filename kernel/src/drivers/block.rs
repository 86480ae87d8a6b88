//! RAM-backed block device.
//!
//! Stands in for a real disk controller: `block_count` 512-byte sectors
//! backed by a heap allocation, zero-initialized at creation. Exists so the
//! VFS's partition scan and virtual-block-device slicing have something to
//! operate on without a real storage controller driver.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use crate::device::{Device, DeviceOps, DeviceType, DriverDescriptor};
use crate::error::{DevError, KernelError};

const SECTOR_SIZE: usize = 512;
const SECTOR_COUNT: u64 = 8192; // 4 MiB

struct RamDisk {
    sectors: Mutex<Vec<u8>>,
}

impl DeviceOps for RamDisk {
    fn read_block(&self, lba: u64, buf: &mut [u8]) -> Result<(), KernelError> {
        if buf.len() != SECTOR_SIZE || lba >= SECTOR_COUNT {
            return Err(KernelError::from(DevError::Unsupported));
        }
        let start = lba as usize * SECTOR_SIZE;
        let data = self.sectors.lock();
        buf.copy_from_slice(&data[start..start + SECTOR_SIZE]);
        Ok(())
    }

    fn write_block(&self, lba: u64, buf: &[u8]) -> Result<(), KernelError> {
        if buf.len() != SECTOR_SIZE || lba >= SECTOR_COUNT {
            return Err(KernelError::from(DevError::Unsupported));
        }
        let start = lba as usize * SECTOR_SIZE;
        let mut data = self.sectors.lock();
        data[start..start + SECTOR_SIZE].copy_from_slice(buf);
        Ok(())
    }
}

fn make_device(
    _bus: Option<&crate::device::pci_bus::BusDevice>,
    _ordinal: usize,
) -> Result<Device, KernelError> {
    let disk = RamDisk {
        sectors: Mutex::new(vec![0u8; SECTOR_SIZE * SECTOR_COUNT as usize]),
    };
    Ok(Device::new(
        DeviceType::Block,
        "ramdisk",
        0,
        0,
        SECTOR_SIZE as u32,
        SECTOR_COUNT,
        Arc::new(disk),
    ))
}

pub fn register() {
    crate::device::register_driver(DriverDescriptor {
        name: "ramdisk",
        bus_match: None,
        num_devices: 1,
        factory: make_device,
    });
}
