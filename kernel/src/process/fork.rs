//! `process_clone` (spec §4.4 "fork"): duplicate a running process into a
//! fresh address space with its own copies of every owned frame.
//!
//! There is no copy-on-write here -- every stack, heap, and data page is
//! eagerly duplicated byte-for-byte, and the child's `PT_LOAD` segments are
//! reloaded from the binary on disk with BSS copied from the parent's live
//! pages (the "copy" ELF loading mode, spec §4.10) rather than zeroed.

use alloc::vec::Vec;

use crate::elf;
use crate::error::KernelError;
use crate::mm::page_table::{phys_to_virt_for_zeroing, AddressSpace, PageFlags};
use crate::mm::vmm::map_fresh_range;
use crate::mm::VirtualAddress;

use super::pcb::{Process, ProcessState};
use super::table;
use super::ProcessId;

/// Duplicate the process named `pid` into a brand new process. Returns the
/// child's pid. The child's saved `rax` is zeroed so it resumes from the
/// same `syscall` instruction seeing a 0 return value, while the parent's
/// own return (this function's result, carried back through `rax` by the
/// ordinary syscall return path) is the child's pid -- together these are
/// "returns child pid in parent, 0 in child" (spec §4.4).
///
/// Built on [`table::fork_register`] rather than `with_process` +
/// `table::register` so that reading the parent and inserting the child
/// happen under one lock acquisition -- `spin::Mutex` does not nest.
pub fn process_clone(pid: ProcessId) -> Result<ProcessId, KernelError> {
    table::fork_register(pid, |src, child_pid| {
        let kernel_space = crate::mm::kernel_address_space();
        let child_space = AddressSpace::new_user(kernel_space)?;

        let stack_pages = clone_pages(src, &child_space, &src.stack_pages_with_addrs())?;
        let heap_pages = clone_pages(src, &child_space, &src.heap_pages_with_addrs())?;

        let image = elf::load_copy(&child_space, &src.path, &src.space)?;

        let mut regs = src.regs;
        regs.set_syscall_return(0);

        Ok(Process {
            pid: child_pid,
            parent: Some(src.pid),
            path: src.path.clone(),
            space: child_space,
            stack_pages,
            heap_pages,
            data_pages: image.data_pages,
            argv: src.argv.clone(),
            envp: src.envp.clone(),
            descriptors: src.descriptors.clone_all()?,
            regs,
            state: ProcessState::Runnable,
        })
    })
}

/// Allocate fresh frames at the same virtual addresses `pages` names in
/// `src`, byte-copying each page's content out of `src`'s mapping.
fn clone_pages(
    src: &Process,
    child_space: &AddressSpace,
    pages: &[VirtualAddress],
) -> Result<Vec<crate::mm::frame_allocator::FrameNumber>, KernelError> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }
    let base = pages[0];
    let frames = map_fresh_range(
        child_space,
        base,
        pages.len(),
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )?;
    for (vaddr, frame) in pages.iter().zip(frames.iter()) {
        if let Some(src_phys) = src.space.translate(*vaddr) {
            let src_ptr = phys_to_virt_for_zeroing(src_phys).as_u64() as *const u8;
            let dst_ptr = phys_to_virt_for_zeroing(frame.as_addr()).as_u64() as *mut u8;
            // SAFETY: `src_ptr` is backed by the parent's still-mapped
            // frame, `dst_ptr` by the frame just allocated above for the
            // child; both aliases are direct-mapped and page-sized, and the
            // two frames are always distinct.
            unsafe {
                core::ptr::copy_nonoverlapping(src_ptr, dst_ptr, crate::mm::frame_allocator::FRAME_SIZE);
            }
        }
    }
    Ok(frames)
}
