//! `process_create` (spec §4.4 steps 1-8) and `setup_initial_stack`.

use alloc::string::String;
use alloc::vec::Vec;

use crate::elf;
use crate::error::{KernelError, MmError};
use crate::mm::frame_allocator::FRAME_SIZE;
use crate::mm::page_table::{AddressSpace, PageFlags};
use crate::mm::user_validation::copy_to_user;
use crate::mm::vmm::map_fresh_range;
use crate::mm::VirtualAddress;
use crate::stream::DescriptorTable;

use super::pcb::{Process, ProcessState};
use super::table;
use super::{PROCESS_STACK_PAGES, PROCESS_STACK_VADDR_BASE};

/// Build a fresh process running the ELF binary at `path` (spec §4.4):
///
/// 1. allocate a pid
/// 2. open and load the binary into a new address space
/// 3. map a fixed 3-page stack
/// 4. write argv/envp onto that stack
/// 5. start with all 8 descriptors as `Stream::Null`
/// 6. register with the runqueue, runnable
pub fn process_create(
    path: &str,
    parent: Option<super::ProcessId>,
    argv: Vec<String>,
    envp: Vec<String>,
) -> Result<super::ProcessId, KernelError> {
    let kernel_space = crate::mm::kernel_address_space();
    let space = AddressSpace::new_user(kernel_space)?;

    let image = elf::load(&space, path)?;

    let stack_pages = map_fresh_range(
        &space,
        VirtualAddress::new(PROCESS_STACK_VADDR_BASE),
        PROCESS_STACK_PAGES as usize,
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )?;

    let pid = table::alloc_pid();
    let mut proc = Process {
        pid,
        parent,
        path: String::from(path),
        space,
        stack_pages,
        heap_pages: Vec::new(),
        data_pages: image.data_pages,
        argv,
        envp,
        descriptors: DescriptorTable::new(),
        regs: crate::arch::x86_64::context::SavedRegisters::for_new_process(image.entry, 0),
        state: ProcessState::Created,
    };

    let stack_top = proc.stack_top();
    let layout = setup_initial_stack(&proc.space, stack_top, &proc.argv, &proc.envp)?;
    proc.regs.rsp = layout.sp;
    proc.regs
        .set_abi_args(layout.argc, layout.argv_ptr, layout.envc, layout.envp_ptr);
    proc.state = ProcessState::Runnable;

    table::register(proc);
    Ok(pid)
}

pub(crate) struct StackLayout {
    pub(crate) sp: u64,
    pub(crate) argc: u64,
    pub(crate) argv_ptr: u64,
    pub(crate) envc: u64,
    pub(crate) envp_ptr: u64,
}

/// Lay out argv/envp onto a process's own stack, top-down: string bytes
/// first, then (after 16-byte alignment) the envp pointer array terminated
/// by a null word, then the argv pointer array terminated by a null word
/// (spec §4.4). `space` must already have the process's stack pages mapped.
///
/// `pub(crate)` rather than private: `exec` (spec §4.8) reuses this exactly,
/// replacing a process's image in place rather than creating a new one.
pub(crate) fn setup_initial_stack(
    space: &AddressSpace,
    stack_top: u64,
    argv: &[String],
    envp: &[String],
) -> Result<StackLayout, KernelError> {
    let stack_bottom = stack_top - super::PROCESS_STACK_PAGES * FRAME_SIZE as u64;
    let mut cursor = stack_top;

    let mut push_raw = |cursor: &mut u64, bytes: &[u8]| -> Result<u64, KernelError> {
        *cursor -= bytes.len() as u64;
        if *cursor < stack_bottom {
            return Err(MmError::StackOverflow.into());
        }
        copy_to_user(space, VirtualAddress::new(*cursor), bytes)?;
        Ok(*cursor)
    };

    let mut argv_addrs = Vec::with_capacity(argv.len());
    for s in argv {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        argv_addrs.push(push_raw(&mut cursor, &bytes)?);
    }

    let mut envp_addrs = Vec::with_capacity(envp.len());
    for s in envp {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        envp_addrs.push(push_raw(&mut cursor, &bytes)?);
    }

    cursor &= !0xf;

    let envp_null = push_raw(&mut cursor, &0u64.to_le_bytes())?;
    let mut envp_ptr = envp_null;
    for addr in envp_addrs.iter().rev() {
        envp_ptr = push_raw(&mut cursor, &addr.to_le_bytes())?;
    }

    let argv_null = push_raw(&mut cursor, &0u64.to_le_bytes())?;
    let mut argv_ptr = argv_null;
    for addr in argv_addrs.iter().rev() {
        argv_ptr = push_raw(&mut cursor, &addr.to_le_bytes())?;
    }

    Ok(StackLayout {
        sp: cursor,
        argc: argv_addrs.len() as u64,
        argv_ptr,
        envc: envp_addrs.len() as u64,
        envp_ptr,
    })
}
