//! The process-control group of the syscall table (spec §4.4/§4.8): fork,
//! exit, ping, exec, alloc.

use alloc::string::String;
use alloc::vec::Vec;

use crate::elf;
use crate::error::{KernelError, SyscallError};
use crate::mm::frame_allocator::FRAME_SIZE;
use crate::mm::page_table::{AddressSpace, PageFlags};
use crate::mm::user_validation::copy_user_cstr;
use crate::mm::vmm::map_fresh_range;
use crate::mm::VirtualAddress;
use crate::process::creation::setup_initial_stack;
use crate::process::pcb::{Process, ProcessState};
use crate::process::{exit, fork, table, ProcessId};
use crate::stream::DescriptorTable;

const MAX_PATH_LEN: usize = 256;
const MAX_ARG_LEN: usize = 256;
const MAX_ARGS: usize = 64;

/// `fork()`: duplicate the caller into a brand new process. Returns the
/// child's pid to the parent; the child observes a return value of 0
/// because [`fork::process_clone`] zeroes the saved `rax` in its copy of the
/// register set before it is ever dispatched.
///
/// Calls [`fork::process_clone`] directly rather than from inside a
/// `table::with_process` closure -- `process_clone` already manages its own
/// single lock acquisition through `table::fork_register`, and nesting a
/// second `TABLE.lock()` inside that closure would deadlock (`spin::Mutex`
/// does not nest).
pub fn sys_fork(pid: ProcessId, _: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    let child = fork::process_clone(pid)?;
    Ok(child.as_u64() as i64)
}

/// `exit(code)`: mark the caller a zombie and dispatch the next runqueue
/// entry. The record itself isn't freed here -- that happens the next time
/// the scheduler's cursor passes over it (spec §3's `Zombie` is "transient,
/// ... the next scheduler tick"), which `sched::execute_next_process`
/// already does as it advances.
pub fn sys_exit(pid: ProcessId, code: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    log::info!("process {} exited with code {}", pid, code as i64);
    let _ = table::with_process(pid, |p| p.state = ProcessState::Zombie);
    crate::sched::execute_next_process()
}

/// `ping(target)`: the waitpid primitive this core exposes -- returns
/// `target` if it still has a table entry, `0` otherwise. A caller
/// spin-loops on this to wait for a child to exit.
pub fn sys_ping(_pid: ProcessId, target: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    let target_pid = ProcessId::new(target);
    Ok(if table::contains(target_pid) { target as i64 } else { 0 })
}

/// `alloc()`: hand out one fresh heap page in the caller's own address
/// space, at the next slot past whatever `alloc` has already handed out.
/// Returns the page's user virtual address.
pub fn sys_alloc(pid: ProcessId, _: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| {
        let index = p.heap_pages.len() as u64;
        let vaddr = VirtualAddress::new(crate::process::USER_HEAP_VADDR_BASE + index * FRAME_SIZE as u64);
        let frames = map_fresh_range(
            &p.space,
            vaddr,
            1,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
        )?;
        p.heap_pages.push(frames[0]);
        Ok(vaddr.as_u64() as i64)
    })?
}

/// User-supplied layout for `exec`'s second argument: a pointer to this
/// five-word struct rather than five separate registers, since `argv`/`envp`
/// are themselves arrays whose length isn't known until walked.
struct ExecCreateInfo {
    argv: u64,
    envp: u64,
    stdin_fd: u64,
    stdout_fd: u64,
    stderr_fd: u64,
}

fn read_create_info(space: &AddressSpace, ptr: u64) -> Result<ExecCreateInfo, KernelError> {
    let bytes = crate::mm::user_validation::copy_from_user(space, VirtualAddress::new(ptr), 40)?;
    let word = |i: usize| u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
    Ok(ExecCreateInfo {
        argv: word(0),
        envp: word(1),
        stdin_fd: word(2),
        stdout_fd: word(3),
        stderr_fd: word(4),
    })
}

/// Walk a NULL-terminated array of user string pointers, copying each
/// pointee out as a `String`. Bounded by `MAX_ARGS` so a malformed (never
/// NULL-terminated) array can't loop forever.
fn read_user_ptr_array(space: &AddressSpace, ptr: u64, max: usize) -> Result<Vec<String>, KernelError> {
    let mut out = Vec::new();
    let mut cursor = ptr;
    for _ in 0..max {
        let raw = crate::mm::user_validation::copy_from_user(space, VirtualAddress::new(cursor), 8)?;
        let entry = u64::from_le_bytes(raw.try_into().unwrap());
        if entry == 0 {
            return Ok(out);
        }
        out.push(copy_user_cstr(space, VirtualAddress::new(entry), MAX_ARG_LEN)?);
        cursor += 8;
    }
    Err(SyscallError::InvalidArgument.into())
}

/// `exec(path, create_info)`: replace the caller's image in place, keeping
/// its pid. The new address space, ELF image, and stack are built before
/// anything in the process table is touched, so a bad path or corrupt ELF
/// fails cleanly with the caller's old image still intact and still
/// runnable; only once the replacement process is fully built does this
/// free the old one and register the new one under the same pid (spec
/// §4.8).
pub fn sys_exec(pid: ProcessId, path_ptr: u64, create_info_ptr: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    let (path, argv, envp, info) = table::with_process(pid, |p| {
        let info = read_create_info(&p.space, create_info_ptr)?;
        let path = copy_user_cstr(&p.space, VirtualAddress::new(path_ptr), MAX_PATH_LEN)?;
        let argv = read_user_ptr_array(&p.space, info.argv, MAX_ARGS)?;
        let envp = read_user_ptr_array(&p.space, info.envp, MAX_ARGS)?;
        Ok::<_, KernelError>((path, argv, envp, info))
    })??;

    let kernel_space = crate::mm::kernel_address_space();
    let space = AddressSpace::new_user(kernel_space)?;
    let image = elf::load(&space, &path)?;

    let stack_pages = map_fresh_range(
        &space,
        VirtualAddress::new(crate::process::PROCESS_STACK_VADDR_BASE),
        crate::process::PROCESS_STACK_PAGES as usize,
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )?;
    let stack_top = crate::process::PROCESS_STACK_VADDR_BASE
        + crate::process::PROCESS_STACK_PAGES * FRAME_SIZE as u64;

    let mut descriptors = DescriptorTable::new();
    table::with_process(pid, |p| {
        p.descriptors.inherit_into(info.stdin_fd as usize, &mut descriptors, 0)?;
        p.descriptors.inherit_into(info.stdout_fd as usize, &mut descriptors, 1)?;
        p.descriptors.inherit_into(info.stderr_fd as usize, &mut descriptors, 2)?;
        Ok::<(), KernelError>(())
    })??;

    let mut regs = crate::arch::x86_64::context::SavedRegisters::for_new_process(image.entry, 0);
    let layout = setup_initial_stack(&space, stack_top, &argv, &envp)?;
    regs.rsp = layout.sp;
    regs.set_abi_args(layout.argc, layout.argv_ptr, layout.envc, layout.envp_ptr);

    let parent = table::with_process(pid, |p| p.parent)?;
    let new_proc = Process {
        pid,
        parent,
        path,
        space,
        stack_pages,
        heap_pages: Vec::new(),
        data_pages: image.data_pages,
        argv,
        envp,
        descriptors,
        regs,
        state: ProcessState::Runnable,
    };

    let _ = exit::process_free(pid);
    table::register(new_proc);
    crate::sched::execute_next_process()
}
