//! `process_free` (spec §4.4): release every frame a process owns -- its
//! stack/heap/data leaves, every intermediate PDPT/PD/PT frame its page
//! tables allocated, and the PML4 itself -- and remove it from the table.

use alloc::collections::BTreeSet;

use crate::error::KernelError;

use super::table;
use super::ProcessId;

/// Tear down `pid`: free its stack, heap, and data frames, release its
/// PML4 and every page-table frame backing it, drop its descriptor table
/// (closing every open stream), and remove it from the runqueue. The
/// caller (the scheduler, on observing `ProcessState::Zombie`) must not
/// dispatch `pid` again after this returns.
pub fn process_free(pid: ProcessId) -> Result<(), KernelError> {
    let proc = table::unregister(pid).ok_or(crate::error::ProcError::NotFound)?;

    let mut known_leaves = BTreeSet::new();
    for frame in &proc.stack_pages {
        known_leaves.insert(frame.as_addr().as_u64());
    }
    for frame in &proc.heap_pages {
        known_leaves.insert(frame.as_addr().as_u64());
    }
    for (_, frame) in &proc.data_pages {
        known_leaves.insert(frame.as_addr().as_u64());
    }

    for frame in &proc.stack_pages {
        let _ = crate::mm::free_frame(*frame);
    }
    for frame in &proc.heap_pages {
        let _ = crate::mm::free_frame(*frame);
    }
    for (_, frame) in &proc.data_pages {
        let _ = crate::mm::free_frame(*frame);
    }

    // Releases every PDPT/PD/PT frame `map` allocated plus the PML4 frame
    // itself; leaves already freed above are skipped via `known_leaves` so
    // this never double-frees a stack/heap/data page.
    proc.space.teardown(&known_leaves);

    // `proc.descriptors` drops here, closing every stream it still holds.
    Ok(())
}
