// Print macros for kernel output.
//
// There is no VGA text console here (spec Non-goals: per-driver hardware
// detail); everything the kernel prints goes out over the COM1 serial line
// via `serial::_serial_print`.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_serial_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
