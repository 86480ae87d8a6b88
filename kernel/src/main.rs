//! Binary shim.
//!
//! All real code lives in the library crate. `arch::x86_64::boot` uses
//! `bootloader_api::entry_point!` to generate `_start` and wire it to
//! `bootstrap::run`, so this binary only needs to pull the library in so
//! the linker sees that generated entry point.
#![no_std]
#![no_main]

use hydra_kernel as _;
