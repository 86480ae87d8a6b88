//! The `log` crate's sink (spec §4.9) and the real (non-test) panic handler.
//!
//! Every `log::info!`/`warn!`/`error!` call site elsewhere in this kernel
//! already exists; nothing before this module ever called `log::set_logger`,
//! so none of it went anywhere. [`init`] installs [`KernelLogger`], which
//! formats `[tick][LEVEL][target] message` (the tick comes from
//! `arch::timer::get_ticks`, the same counter the scheduler ticks off) and
//! writes it to both the serial console and the `e9` debug port.
//!
//! The panic handler lives here rather than in `arch::x86_64::entry` because
//! it needs the same sink: walk the frame-pointer chain, resolve each return
//! address against the kernel image's own symbol table (sourced from
//! `BootConfig`), fall back to the raw address if the image has none or the
//! address doesn't resolve, then halt with interrupts masked.

#![allow(dead_code)]

use core::fmt::Write;
use core::panic::PanicInfo;

use log::{LevelFilter, Log, Metadata, Record};

use crate::arch::timer::get_ticks;
use crate::mm::page_table::phys_to_virt_for_zeroing;
use crate::mm::PhysicalAddress;

struct Sink;

impl Write for Sink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        crate::serial::_serial_print(format_args!("{}", s));
        crate::drivers::e9::write_str(s);
        Ok(())
    }
}

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut sink = Sink;
        let _ = writeln!(
            sink,
            "[{}][{}][{}] {}",
            get_ticks(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the global logger. Must run exactly once, after `arch::timer` is
/// ticking but before anything the kernel wants logged.
pub fn init() {
    log::set_logger(&LOGGER).expect("klog::init must run exactly once");
    log::set_max_level(LevelFilter::Trace);
}

// --- Kernel-image symbol resolution -------------------------------------

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const SHT_SYMTAB: u32 = 2;
const STT_FUNC: u8 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Shdr {
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Sym {
    name: u32,
    info: u8,
    other: u8,
    shndx: u16,
    value: u64,
    size: u64,
}

/// Borrow the kernel image's bytes through the physical-memory direct map.
///
/// # Safety
/// `phys_start`/`len` must describe memory the bootloader actually loaded
/// the kernel image into, and the direct map must already be active.
unsafe fn kernel_image_bytes(phys_start: u64, len: u64) -> &'static [u8] {
    let virt = phys_to_virt_for_zeroing(PhysicalAddress::new(phys_start));
    core::slice::from_raw_parts(virt.as_u64() as *const u8, len as usize)
}

/// Find the nearest `STT_FUNC` symbol at or below `addr` in the kernel's own
/// `.symtab`, if the image carries one. Best-effort: a stripped image, a
/// `phys_start`/`len` boot didn't report, or a malformed header all just
/// mean "no symbol", not a panic-handler panic.
fn resolve_symbol(addr: u64) -> Option<(&'static str, u64)> {
    let config = crate::mm::boot_config();
    if config.kernel_image_phys_start == 0 || config.kernel_image_phys_len == 0 {
        return None;
    }
    // SAFETY: boot_config() is only populated from a real BootInfo handoff,
    // and mm::init has already brought up the direct map by the time any
    // code can panic.
    let bytes = unsafe {
        kernel_image_bytes(config.kernel_image_phys_start, config.kernel_image_phys_len)
    };

    if bytes.len() < 64 || bytes[0..4] != ELF_MAGIC {
        return None;
    }
    let e_shoff = u64::from_le_bytes(bytes.get(0x28..0x30)?.try_into().ok()?) as usize;
    let e_shentsize = u16::from_le_bytes(bytes.get(0x3a..0x3c)?.try_into().ok()?) as usize;
    let e_shnum = u16::from_le_bytes(bytes.get(0x3c..0x3e)?.try_into().ok()?) as usize;
    if e_shoff == 0 || e_shentsize == 0 {
        return None;
    }

    let shdr_at = |i: usize| -> Option<Elf64Shdr> {
        let off = e_shoff + i * e_shentsize;
        let raw = bytes.get(off..off + core::mem::size_of::<Elf64Shdr>())?;
        // SAFETY: repr(C), bounds checked above.
        Some(unsafe { (raw.as_ptr() as *const Elf64Shdr).read_unaligned() })
    };

    let mut symtab = None;
    for i in 0..e_shnum {
        let sh = shdr_at(i)?;
        if sh.sh_type == SHT_SYMTAB {
            symtab = Some(sh);
            break;
        }
    }
    let symtab = symtab?;
    let strtab = shdr_at(symtab.link as usize)?;

    let sym_count = symtab.size as usize / core::mem::size_of::<Elf64Sym>();
    let mut best: Option<(&'static str, u64)> = None;
    for i in 0..sym_count {
        let off = symtab.offset as usize + i * core::mem::size_of::<Elf64Sym>();
        let raw = bytes.get(off..off + core::mem::size_of::<Elf64Sym>())?;
        // SAFETY: repr(C), bounds checked above.
        let sym = unsafe { (raw.as_ptr() as *const Elf64Sym).read_unaligned() };
        if sym.info & 0xf != STT_FUNC || sym.value == 0 || sym.value > addr {
            continue;
        }
        if best.is_none_or(|(_, best_value)| sym.value > best_value) {
            let name_off = strtab.offset as usize + sym.name as usize;
            let name_bytes = bytes.get(name_off..)?;
            let end = name_bytes.iter().position(|&b| b == 0)?;
            let name = core::str::from_utf8(&name_bytes[..end]).ok()?;
            best = Some((name, sym.value));
        }
    }
    best
}

/// Walk the frame-pointer chain starting at the current `rbp`, printing one
/// `#n  0xADDR (symbol+offset)` line per frame through [`Sink`]. Stops at a
/// null or misaligned `rbp`, or after `MAX_FRAMES` -- a corrupt chain is not
/// allowed to spin forever while the machine is already going down.
fn print_backtrace() {
    const MAX_FRAMES: usize = 32;

    let mut rbp: u64;
    // SAFETY: reading the current frame pointer has no side effects.
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }

    let mut sink = Sink;
    let _ = writeln!(sink, "[{}][ERROR][panic] backtrace:", get_ticks());
    for frame in 0..MAX_FRAMES {
        if rbp == 0 || rbp % 8 != 0 {
            break;
        }
        // SAFETY: best-effort walk of a frame-pointer chain this kernel's
        // own functions built; a bad chain just fails the bounds/alignment
        // check above or faults, which is acceptable while already panicking.
        let (saved_rbp, return_addr) = unsafe {
            let frame_ptr = rbp as *const u64;
            (frame_ptr.read_volatile(), frame_ptr.add(1).read_volatile())
        };
        if return_addr == 0 {
            break;
        }
        match resolve_symbol(return_addr) {
            Some((name, start)) => {
                let _ = writeln!(sink, "  #{frame}  {return_addr:#x} ({name}+{:#x})", return_addr - start);
            }
            None => {
                let _ = writeln!(sink, "  #{frame}  {return_addr:#x}");
            }
        }
        rbp = saved_rbp;
    }
}

/// The real `#[panic_handler]` (wired in `lib.rs`). Logs the panic message at
/// `Level::Error`, prints a best-effort backtrace, then halts with
/// interrupts masked -- there is no supervisor to hand off to.
pub fn panic(info: &PanicInfo) -> ! {
    let mut sink = Sink;
    let _ = writeln!(sink, "[{}][ERROR][panic] {}", get_ticks(), info);
    print_backtrace();
    crate::arch::halt();
}
