//! COM1 serial console.
//!
//! The only console this kernel has: `print!`/`println!` (`print.rs`) and
//! `serial_print!`/`serial_println!` both funnel here. IRQs are masked for
//! the duration of a write so a timer tick can't interleave bytes from two
//! different log lines.

use core::fmt;

use uart_16550::SerialPort;
use x86_64::instructions::interrupts;

pub struct Console {
    inner: SerialPort,
}

impl Console {
    #[allow(dead_code)]
    pub fn from_inner(inner: SerialPort) -> Self {
        Self { inner }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_str(s)
    }
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_serial_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn _serial_print(args: fmt::Arguments) {
    use core::fmt::Write;

    interrupts::without_interrupts(|| {
        // SAFETY: 0x3F8 is the standard COM1 I/O base. Re-initializing on
        // every call is wasteful but harmless -- the 16550 has no state that
        // a repeated `init()` could corrupt, and this keeps the console
        // usable even before any one-time serial setup has run.
        let mut port = unsafe { SerialPort::new(0x3F8) };
        port.init();
        port.write_fmt(args).ok();
    });
}
