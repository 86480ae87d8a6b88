//! A `static`-friendly once-initialized global, built on [`spin::Once`].
//!
//! Every kernel singleton (log service, PMM, VFS root, device registry) is
//! `const`-constructed at link time and filled in exactly once during boot.
//! `GlobalState` is the shared shape for "not yet initialized" access: reads
//! before `init()` quietly return `None` instead of panicking, which matters
//! for code (like the panic handler) that may run before boot finishes.

use spin::Once;

pub struct GlobalState<T> {
    inner: Once<T>,
}

impl<T> GlobalState<T> {
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    /// Initialize the value. Returns `Err(())` if already initialized.
    pub fn init(&self, value: T) -> Result<(), ()> {
        let mut already = false;
        self.inner.call_once(|| {
            already = true;
            value
        });
        // `call_once` silently no-ops if already initialized; `already` is
        // only ever observed true on the call that actually stored `value`.
        if already {
            Ok(())
        } else {
            Err(())
        }
    }

    /// Run `f` with a shared reference, if initialized.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.get().map(f)
    }

    /// Run `f` with a shared reference, if initialized. Named distinctly
    /// from [`Self::with`] for call sites that only need interior
    /// mutability through `T` itself (e.g. `Mutex<Inner>`).
    pub fn with_mut<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.get().map(f)
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}
