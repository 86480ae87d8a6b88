//! Global process registry and round-robin runqueue.
//!
//! An arena (`BTreeMap<ProcessId, Process>`) replaces the source's intrusive
//! linked list (spec §9 "Doubly-linked process ... lists": arena-with-indices
//! is equally valid and safer); the run order itself is a flat `Vec<ProcessId>`
//! with a cursor, which plays the role of the singly-linked list's "current"
//! pointer. Access to a process is always mediated through `with_process`
//! rather than a returned reference, the same shape `device::with_device`
//! uses, so the table's lock is never held past a single call.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::error::{KernelError, ProcError};

use super::pcb::{Process, ProcessId};

struct Table {
    processes: BTreeMap<ProcessId, Process>,
    runqueue: Vec<ProcessId>,
    current: usize,
}

impl Table {
    const fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            runqueue: Vec::new(),
            current: 0,
        }
    }
}

static TABLE: Mutex<Table> = Mutex::new(Table::new());
static NEXT_PID: AtomicU64 = AtomicU64::new(1);

pub fn alloc_pid() -> ProcessId {
    ProcessId::new(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

/// Insert a newly created process into the table and the back of the
/// runqueue.
pub fn register(proc: Process) {
    let mut t = TABLE.lock();
    t.runqueue.push(proc.pid);
    t.processes.insert(proc.pid, proc);
}

/// Remove `pid` from the table and runqueue. If the victim was the "current"
/// slot, the cursor stays in place so it now names whatever process slid
/// into that position (or wraps to the front).
pub fn unregister(pid: ProcessId) -> Option<Process> {
    let mut t = TABLE.lock();
    let proc = t.processes.remove(&pid);
    if let Some(pos) = t.runqueue.iter().position(|&p| p == pid) {
        t.runqueue.remove(pos);
        if t.current > pos && t.current > 0 {
            t.current -= 1;
        }
        if !t.runqueue.is_empty() {
            t.current %= t.runqueue.len();
        } else {
            t.current = 0;
        }
    }
    proc
}

/// Run `f` with mutable access to the process named `pid`. The table's lock
/// is held only for the duration of `f`.
pub fn with_process<R>(pid: ProcessId, f: impl FnOnce(&mut Process) -> R) -> Result<R, KernelError> {
    let mut t = TABLE.lock();
    let proc = t
        .processes
        .get_mut(&pid)
        .ok_or(KernelError::from(ProcError::NotFound))?;
    Ok(f(proc))
}

/// Build and register a child of `pid` atomically with respect to the
/// table lock: `build` sees the parent immutably and the freshly allocated
/// child pid, and its result is inserted before the lock is released.
///
/// This exists so `process::fork::process_clone` never has to call
/// [`register`] (which locks `TABLE`) from inside a closure that is already
/// holding it -- `spin::Mutex` is not reentrant, and `with_process` is the
/// only other way to reach a live `Process`.
pub fn fork_register(
    pid: ProcessId,
    build: impl FnOnce(&Process, ProcessId) -> Result<Process, KernelError>,
) -> Result<ProcessId, KernelError> {
    let mut t = TABLE.lock();
    let src = t
        .processes
        .get(&pid)
        .ok_or(KernelError::from(ProcError::NotFound))?;
    let child_pid = ProcessId::new(NEXT_PID.fetch_add(1, Ordering::Relaxed));
    let child = build(src, child_pid)?;
    t.runqueue.push(child_pid);
    t.processes.insert(child_pid, child);
    Ok(child_pid)
}

pub fn contains(pid: ProcessId) -> bool {
    TABLE.lock().processes.contains_key(&pid)
}

pub fn process_count() -> usize {
    TABLE.lock().processes.len()
}

/// The pid the scheduler is currently (or about to be) dispatching.
pub fn current_pid() -> Option<ProcessId> {
    let t = TABLE.lock();
    t.runqueue.get(t.current).copied()
}

/// Advance the round-robin cursor and return the pid it now names.
pub fn advance() -> Option<ProcessId> {
    let mut t = TABLE.lock();
    if t.runqueue.is_empty() {
        return None;
    }
    t.current = (t.current + 1) % t.runqueue.len();
    t.runqueue.get(t.current).copied()
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn pid_allocation_is_monotonic() {
        let a = alloc_pid();
        let b = alloc_pid();
        assert!(b.as_u64() > a.as_u64());
    }
}
