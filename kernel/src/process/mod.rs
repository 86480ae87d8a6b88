//! Process management: one address space, one register set, one descriptor
//! table per process (spec §3/§4.4). There is no thread concept -- a
//! process *is* the schedulable unit.

pub mod creation;
pub mod exit;
pub mod fork;
pub mod pcb;
pub mod table;

pub use pcb::{Process, ProcessId, ProcessState};

/// Virtual address every process image is linked at and loaded to (spec
/// §4.10): user binaries are built as fixed-address executables, not PIEs.
pub const PROCESS_VADDR: u64 = 0x0000_5555_0000_0000;

/// Base of the fixed-size user stack, mapped read/write/no-execute.
pub const PROCESS_STACK_VADDR_BASE: u64 = 0x0000_7fff_0000_0000;

/// Every process gets this many stack pages regardless of requested argv/
/// envp size (spec §4.4); `setup_initial_stack` fails with `AbiError::Overflow`
/// if the frame doesn't fit.
pub const PROCESS_STACK_PAGES: u64 = 3;

/// Base of the region `alloc` hands out pages from, one frame per call.
pub const USER_HEAP_VADDR_BASE: u64 = 0x0000_6000_0000_0000;

/// The pid the scheduler is currently dispatching, if any process exists.
pub fn current_process_id() -> Option<ProcessId> {
    table::current_pid()
}
