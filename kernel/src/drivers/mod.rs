//! Concrete device drivers.
//!
//! Each submodule registers one `device::DriverDescriptor` with the device
//! manager; none of them talk to hardware the device manager hasn't already
//! found (or, for the wildcard drivers, hardware at all -- a RAM disk, the
//! boot framebuffer snapshot, and the timer-jitter entropy source all exist
//! without a PCI function behind them).

pub mod block;
pub mod e9;
pub mod keyboard;
pub mod rng;
pub mod video;

/// Register every driver this kernel ships with the device manager. Must run
/// before `device::init_devices`.
pub fn register_all() {
    keyboard::register();
    block::register();
    video::register();
    rng::register();
    e9::register();
}
