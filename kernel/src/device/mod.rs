//! Device manager: a driver registry matched against a bus-scanned device
//! table, plus the resulting flat vector of live devices.
//!
//! Two kinds of driver exist. Wildcard drivers (`bus_match: None`) have no
//! hardware counterpart to match against -- a RAM-backed block device, the
//! boot framebuffer, the entropy source -- and are simply invoked once at
//! init. Bus-matched drivers carry a `BusMatch` with `0xFF`/`0xFFFF`
//! standing in for "any value" per field, and are invoked once per PCI
//! function that matches.
//!
//! Every device operation funnels through the `DeviceOps` trait rather than
//! a raw function-pointer vtable; a concrete driver only overrides the
//! handful of methods relevant to its `DeviceType` and inherits `Unsupported`
//! for the rest.

pub mod pci_bus;

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{DevError, KernelError};
use crate::mm::PhysicalAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Block,
    Char,
    Input,
    Video,
    Rng,
    Net,
}

/// A rectangle in display-surface coordinates. Used both to describe the
/// current display geometry and to describe the region of a framebuffer
/// that should be presented.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Operation set implemented by a concrete device. Every method defaults to
/// `Unsupported` so a driver only needs to override what its device type
/// actually does.
pub trait DeviceOps: Send + Sync {
    fn read(&self, _buf: &mut [u8]) -> Result<usize, KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn write(&self, _buf: &[u8]) -> Result<usize, KernelError> {
        Err(DevError::Unsupported.into())
    }
    /// Poll for one unit of input. `Ok(None)` means nothing pending.
    fn poll(&self) -> Result<Option<u8>, KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn read_block(&self, _lba: u64, _buf: &mut [u8]) -> Result<(), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn write_block(&self, _lba: u64, _buf: &[u8]) -> Result<(), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn eject(&self) -> Result<(), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn randomize_buffer(&self, _buf: &mut [u8]) -> Result<(), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn get_display_rect(&self) -> Result<Rect, KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn create_framebuffer(&self, _rect: Rect) -> Result<(PhysicalAddress, usize), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn update_display(&self, _rect: Rect) -> Result<(), KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn send(&self, _buf: &[u8]) -> Result<usize, KernelError> {
        Err(DevError::Unsupported.into())
    }
    fn recv(&self, _buf: &mut [u8]) -> Result<usize, KernelError> {
        Err(DevError::Unsupported.into())
    }
}

pub struct Device {
    pub dtype: DeviceType,
    pub name: &'static str,
    pub vendor: u16,
    pub device_id: u16,
    pub block_size: u32,
    pub block_count: u64,
    ops: Arc<dyn DeviceOps>,
}

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dtype: DeviceType,
        name: &'static str,
        vendor: u16,
        device_id: u16,
        block_size: u32,
        block_count: u64,
        ops: Arc<dyn DeviceOps>,
    ) -> Self {
        Device {
            dtype,
            name,
            vendor,
            device_id,
            block_size,
            block_count,
            ops,
        }
    }

    pub fn ops(&self) -> &dyn DeviceOps {
        &*self.ops
    }
}

/// A driver's hardware match, with `0xFF`/`0xFFFF` meaning "any".
#[derive(Debug, Clone, Copy)]
pub struct BusMatch {
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub vendor: u16,
    pub device: u16,
}

impl BusMatch {
    pub const ANY: BusMatch = BusMatch {
        class: 0xFF,
        subclass: 0xFF,
        prog_if: 0xFF,
        vendor: 0xFFFF,
        device: 0xFFFF,
    };

    fn matches(&self, d: &pci_bus::BusDevice) -> bool {
        (self.class == 0xFF || self.class == d.class)
            && (self.subclass == 0xFF || self.subclass == d.subclass)
            && (self.prog_if == 0xFF || self.prog_if == d.prog_if)
            && (self.vendor == 0xFFFF || self.vendor == d.vendor)
            && (self.device == 0xFFFF || self.device == d.device)
    }
}

pub type FactoryFn =
    fn(bus: Option<&pci_bus::BusDevice>, ordinal: usize) -> Result<Device, KernelError>;

pub struct DriverDescriptor {
    pub name: &'static str,
    pub bus_match: Option<BusMatch>,
    pub num_devices: usize,
    pub factory: FactoryFn,
}

static DRIVER_REGISTRY: Mutex<Vec<DriverDescriptor>> = Mutex::new(Vec::new());
static DEVICES: Mutex<Vec<Device>> = Mutex::new(Vec::new());

pub fn register_driver(d: DriverDescriptor) {
    DRIVER_REGISTRY.lock().push(d);
}

/// Two-pass device init: wildcard drivers first (no hardware to wait on),
/// then a single PCI bus scan matched against every bus-match driver.
pub fn init_devices() {
    let bus_devices = pci_bus::scan();
    let drivers = DRIVER_REGISTRY.lock();

    for drv in drivers.iter().filter(|d| d.bus_match.is_none()) {
        spawn_wildcard(drv);
    }
    for drv in drivers.iter().filter(|d| d.bus_match.is_some()) {
        let bus_match = drv.bus_match.unwrap();
        for bus_dev in bus_devices.iter().filter(|d| bus_match.matches(d)) {
            spawn_matched(drv, bus_dev);
        }
    }
}

fn spawn_wildcard(drv: &DriverDescriptor) {
    for i in 0..drv.num_devices.max(1) {
        match (drv.factory)(None, i) {
            Ok(dev) => DEVICES.lock().push(dev),
            Err(e) => log::warn!("driver {} failed on device {}: {:?}", drv.name, i, e),
        }
    }
}

fn spawn_matched(drv: &DriverDescriptor, bus_dev: &pci_bus::BusDevice) {
    for i in 0..drv.num_devices.max(1) {
        match (drv.factory)(Some(bus_dev), i) {
            Ok(dev) => DEVICES.lock().push(dev),
            Err(e) => log::warn!("driver {} failed on {:?}: {:?}", drv.name, bus_dev, e),
        }
    }
}

pub fn device_count() -> usize {
    DEVICES.lock().len()
}

pub fn with_device<R>(index: usize, f: impl FnOnce(&Device) -> R) -> Option<R> {
    DEVICES.lock().get(index).map(f)
}

pub fn find_by_vendor_device(vendor: u16, device: u16) -> Option<usize> {
    DEVICES
        .lock()
        .iter()
        .position(|d| d.vendor == vendor && d.device_id == device)
}

pub fn find_by_type_index(dtype: DeviceType, index: usize) -> Option<usize> {
    DEVICES
        .lock()
        .iter()
        .enumerate()
        .filter(|(_, d)| d.dtype == dtype)
        .nth(index)
        .map(|(i, _)| i)
}

/// A cloneable handle into the global device vector, used by `Stream::Driver`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceHandle(pub usize);

impl DeviceHandle {
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        with_device(self.0, |d| d.ops().read(buf)).ok_or(DevError::NotFound.into())?
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        with_device(self.0, |d| d.ops().write(buf)).ok_or(DevError::NotFound.into())?
    }
}
