//! PS/2 keyboard driver.
//!
//! Reads scancodes from I/O port 0x60 (via the IRQ1 handler in
//! `arch::x86_64::idt`), decodes them through the `pc_keyboard` crate
//! (ScancodeSet1, US 104-key layout) honouring shift/ctrl/alt modifiers, and
//! pushes the resulting ASCII bytes to a lock-free ring buffer that
//! `device::DeviceOps::read` for the keyboard's `Driver:input` device polls.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Bitmask: Shift is held.
pub const MOD_SHIFT: u8 = 0x01;
/// Bitmask: Ctrl is held.
pub const MOD_CTRL: u8 = 0x02;
/// Bitmask: Alt is held.
pub const MOD_ALT: u8 = 0x04;
/// Bitmask: Super/Win is held.
pub const MOD_SUPER: u8 = 0x08;

static MODIFIER_STATE: AtomicU8 = AtomicU8::new(0);

/// Get the current modifier key bitmask.
pub fn get_modifiers() -> u8 {
    MODIFIER_STATE.load(Ordering::Relaxed)
}

/// Ring buffer size for decoded key bytes (must be power of 2).
const KEY_BUFFER_SIZE: usize = 256;

/// Lock-free single-producer single-consumer ring buffer for decoded keys.
struct KeyBuffer {
    buf: [u8; KEY_BUFFER_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl KeyBuffer {
    const fn new() -> Self {
        Self {
            buf: [0; KEY_BUFFER_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Push a byte (called from the interrupt handler -- single producer).
    fn push(&mut self, byte: u8) {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & (KEY_BUFFER_SIZE - 1);
        let tail = self.tail.load(Ordering::Acquire);
        if next == tail {
            return; // buffer full, drop key
        }
        self.buf[head] = byte;
        self.head.store(next, Ordering::Release);
    }

    /// Pop a byte (single consumer: `read_key`).
    fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let byte = self.buf[tail];
        self.tail
            .store((tail + 1) & (KEY_BUFFER_SIZE - 1), Ordering::Release);
        Some(byte)
    }
}

// SAFETY: push is single-producer (IRQ1 handler, interrupts disabled for its
// duration), pop is single-consumer (read_key); the atomic head/tail pair is
// the only shared state.
unsafe impl Send for KeyBuffer {}
unsafe impl Sync for KeyBuffer {}

static mut KEY_BUFFER: KeyBuffer = KeyBuffer::new();

static KEYBOARD: Mutex<Option<Keyboard<layouts::Us104Key, ScancodeSet1>>> = Mutex::new(None);

/// Initialize the PS/2 keyboard driver.
pub fn init() {
    let kb = Keyboard::new(
        ScancodeSet1::new(),
        layouts::Us104Key,
        HandleControl::MapLettersToUnicode,
    );
    *KEYBOARD.lock() = Some(kb);
    INITIALIZED.store(true, Ordering::Release);
}

/// Handle a scancode from the PS/2 keyboard interrupt (vector 33).
///
/// Must not call `println!` or otherwise acquire the serial console lock --
/// it runs with interrupts disabled inside the IDT's IRQ1 handler.
pub fn handle_scancode(scancode: u8) {
    use pc_keyboard::KeyCode;

    let mut kb_guard = KEYBOARD.lock();
    let Some(ref mut keyboard) = *kb_guard else {
        return;
    };
    let Ok(Some(key_event)) = keyboard.add_byte(scancode) else {
        return;
    };

    let code = key_event.code;
    let is_down = key_event.state == pc_keyboard::KeyState::Down;
    match code {
        KeyCode::LShift | KeyCode::RShift => update_modifier(MOD_SHIFT, is_down),
        KeyCode::LControl | KeyCode::RControl => update_modifier(MOD_CTRL, is_down),
        KeyCode::LAlt | KeyCode::RAltGr => update_modifier(MOD_ALT, is_down),
        KeyCode::LWin | KeyCode::RWin => update_modifier(MOD_SUPER, is_down),
        _ => {}
    }

    if let Some(DecodedKey::Unicode(ch)) = keyboard.process_keyevent(key_event) {
        if ch.is_ascii() {
            // SAFETY: handle_scancode is the sole producer (IRQ1, interrupts
            // disabled for its duration).
            #[allow(static_mut_refs)]
            unsafe {
                KEY_BUFFER.push(ch as u8);
            }
        }
    }
}

fn update_modifier(bit: u8, down: bool) {
    if down {
        MODIFIER_STATE.fetch_or(bit, Ordering::Relaxed);
    } else {
        MODIFIER_STATE.fetch_and(!bit, Ordering::Relaxed);
    }
}

/// Read one decoded key byte, non-blocking. Backs the `Driver:input`
/// device's `read` operation.
pub fn read_key() -> Option<u8> {
    // SAFETY: read_key is the sole consumer.
    #[allow(static_mut_refs)]
    unsafe {
        KEY_BUFFER.pop()
    }
}

struct KeyboardDevice;

impl crate::device::DeviceOps for KeyboardDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, crate::error::KernelError> {
        match read_key() {
            Some(byte) => {
                if let Some(slot) = buf.first_mut() {
                    *slot = byte;
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            None => Ok(0),
        }
    }

    fn poll(&self) -> Result<Option<u8>, crate::error::KernelError> {
        Ok(read_key())
    }
}

fn make_device(
    _bus: Option<&crate::device::pci_bus::BusDevice>,
    _ordinal: usize,
) -> Result<crate::device::Device, crate::error::KernelError> {
    init();
    Ok(crate::device::Device::new(
        crate::device::DeviceType::Input,
        "ps2-keyboard",
        0,
        0,
        0,
        0,
        alloc::sync::Arc::new(KeyboardDevice),
    ))
}

pub fn register() {
    crate::device::register_driver(crate::device::DriverDescriptor {
        name: "ps2-keyboard",
        bus_match: None,
        num_devices: 1,
        factory: make_device,
    });
}
