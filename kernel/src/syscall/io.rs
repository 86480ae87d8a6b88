//! The I/O group of the syscall table (spec §4.5/§4.8): read, write, open,
//! close, pipe, lseek, all operating on a process's 8-slot descriptor table
//! by index.

use alloc::vec;

use crate::error::{KernelError, SyscallError};
use crate::fs::{self, OpenAction};
use crate::mm::user_validation::{copy_from_user, copy_to_user, copy_user_cstr, validate_user_buffer};
use crate::mm::VirtualAddress;
use crate::process::pcb::Process;
use crate::process::{table, ProcessId};
use crate::stream::{SeekWhence, Stream};

const MAX_PATH_LEN: usize = 256;

/// `read(fd, buf, count)`: read up to `count` bytes from descriptor `fd`
/// into the caller's buffer at `buf`.
pub fn sys_read(pid: ProcessId, fd: u64, buf: u64, count: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| read_impl(p, fd as usize, VirtualAddress::new(buf), count as usize))?
}

fn read_impl(p: &mut Process, fd: usize, buf: VirtualAddress, count: usize) -> Result<i64, KernelError> {
    validate_user_buffer(&p.space, buf, count)?;
    let mut kbuf = vec![0u8; count];
    let n = p.descriptors.get(fd)?.read(&mut kbuf)?;
    copy_to_user(&p.space, buf, &kbuf[..n])?;
    Ok(n as i64)
}

/// `write(fd, buf, count)`: write `count` bytes from the caller's buffer at
/// `buf` to descriptor `fd`.
pub fn sys_write(pid: ProcessId, fd: u64, buf: u64, count: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| write_impl(p, fd as usize, VirtualAddress::new(buf), count as usize))?
}

fn write_impl(p: &mut Process, fd: usize, buf: VirtualAddress, count: usize) -> Result<i64, KernelError> {
    validate_user_buffer(&p.space, buf, count)?;
    let kbuf = copy_from_user(&p.space, buf, count)?;
    let n = p.descriptors.get(fd)?.write(&kbuf)?;
    Ok(n as i64)
}

/// `open(path, action)`: resolve `path` through the VFS and install the
/// resulting file stream in the first free descriptor slot.
pub fn sys_open(pid: ProcessId, path: u64, action: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| open_impl(p, VirtualAddress::new(path), action))?
}

fn open_impl(p: &mut Process, path: VirtualAddress, action: u64) -> Result<i64, KernelError> {
    let path = copy_user_cstr(&p.space, path, MAX_PATH_LEN)?;
    let action = match action {
        0 => OpenAction::Read,
        1 => OpenAction::Write,
        2 => OpenAction::Clear,
        3 => OpenAction::Create,
        _ => return Err(SyscallError::InvalidArgument.into()),
    };
    let (node, mount) = fs::vfs_open(&path, action)?;
    let fd = p.descriptors.allocate(Stream::File(node, mount))?;
    Ok(fd as i64)
}

/// `close(fd)`: release descriptor `fd` and reset it to the null stream.
pub fn sys_close(pid: ProcessId, fd: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| {
        p.descriptors.close(fd as usize)?;
        Ok(0)
    })?
}

/// `pipe()`: allocate a fresh pipe ring and install it in the first free
/// descriptor slot. The returned descriptor is bidirectional -- a second end
/// comes from fork inheriting the same slot, not from a second return value
/// here.
pub fn sys_pipe(pid: ProcessId, _: u64, _: u64, _: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| {
        let fd = p.descriptors.allocate(Stream::new_pipe())?;
        Ok(fd as i64)
    })?
}

/// `lseek(fd, offset, whence)`: reposition a file descriptor's offset.
/// `whence` is `0 = Set, 1 = Add (relative to the current offset), 2 = End`.
pub fn sys_lseek(pid: ProcessId, fd: u64, offset: u64, whence: u64, _: u64, _: u64) -> Result<i64, KernelError> {
    table::with_process(pid, |p| lseek_impl(p, fd as usize, offset as i64, whence))?
}

fn lseek_impl(p: &mut Process, fd: usize, offset: i64, whence: u64) -> Result<i64, KernelError> {
    let whence = match whence {
        0 => SeekWhence::Set,
        1 => SeekWhence::Add,
        2 => SeekWhence::End,
        _ => return Err(SyscallError::InvalidArgument.into()),
    };
    let new_off = p.descriptors.get(fd)?.seek(offset, whence)?;
    i64::try_from(new_off).map_err(|_| SyscallError::InvalidArgument.into())
}
