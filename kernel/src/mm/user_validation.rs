//! User pointer validation for the syscall boundary.
//!
//! Every syscall pointer argument is a user virtual address that must be
//! translated through the calling process's own PML4 (spec: "the handler
//! translates each through the current process's PML4 via `translate`;
//! translation failure returns invalid argument"). There is no demand
//! paging or copy-on-write here, so a successful translation also means the
//! page is actually backed -- a single `translate` call is both the
//! validity check and the address resolution.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use super::frame_allocator::FRAME_SIZE;
use super::page_table::{phys_to_virt_for_zeroing, AddressSpace};
use super::vmm::is_user_range;
use super::VirtualAddress;
use crate::error::{KernelError, SyscallError};

/// Translate one user virtual address through `space`. Fails if the address
/// is outside the user half or the page is unmapped.
pub fn validate_user_pointer(
    space: &AddressSpace,
    addr: VirtualAddress,
) -> Result<super::PhysicalAddress, KernelError> {
    if !is_user_range(addr, 1) {
        return Err(SyscallError::BadPointer.into());
    }
    space
        .translate(addr)
        .ok_or_else(|| SyscallError::BadPointer.into())
}

/// Validate that every page backing `len` bytes starting at `addr` is
/// mapped in `space`. Used for read/write buffer arguments, which must be
/// entirely resolvable before the syscall touches a single byte of them.
pub fn validate_user_buffer(
    space: &AddressSpace,
    addr: VirtualAddress,
    len: usize,
) -> Result<(), KernelError> {
    if len == 0 {
        return Ok(());
    }
    if !is_user_range(addr, len) {
        return Err(SyscallError::BadPointer.into());
    }
    let first_page = addr.as_u64() / FRAME_SIZE as u64;
    let last_page = (addr.as_u64() + len as u64 - 1) / FRAME_SIZE as u64;
    for page in first_page..=last_page {
        let page_addr = VirtualAddress::new(page * FRAME_SIZE as u64);
        if space.translate(page_addr).is_none() {
            return Err(SyscallError::BadPointer.into());
        }
    }
    Ok(())
}

/// Copy `len` bytes starting at the user address `addr` into a fresh kernel
/// `Vec`. Caller must have already validated the range with
/// [`validate_user_buffer`].
pub fn copy_from_user(
    space: &AddressSpace,
    addr: VirtualAddress,
    len: usize,
) -> Result<Vec<u8>, KernelError> {
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let va = addr.add(i);
        let phys = space
            .translate(va)
            .ok_or_else(|| KernelError::from(SyscallError::BadPointer))?;
        let byte_ptr = phys_to_virt_for_zeroing(phys).as_u64() as *const u8;
        // SAFETY: `translate` just confirmed this physical page is mapped
        // and present; the direct-map offset covers all usable RAM.
        out.push(unsafe { byte_ptr.read() });
    }
    Ok(out)
}

/// Copy a NUL-terminated string out of user space, up to `max_len` bytes
/// (not including the terminator). Used by syscalls that take a path or
/// argv/envp entry.
pub fn copy_user_cstr(
    space: &AddressSpace,
    addr: VirtualAddress,
    max_len: usize,
) -> Result<String, KernelError> {
    let mut bytes = Vec::new();
    for i in 0..max_len {
        let va = addr.add(i);
        let phys = space
            .translate(va)
            .ok_or_else(|| KernelError::from(SyscallError::BadPointer))?;
        let byte_ptr = phys_to_virt_for_zeroing(phys).as_u64() as *const u8;
        // SAFETY: same as `copy_from_user`.
        let byte = unsafe { byte_ptr.read() };
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| SyscallError::InvalidArgument.into());
        }
        bytes.push(byte);
    }
    Err(SyscallError::InvalidArgument.into())
}

/// Write `data` into user space starting at `addr`. Caller must have
/// already validated the destination range with [`validate_user_buffer`].
pub fn copy_to_user(
    space: &AddressSpace,
    addr: VirtualAddress,
    data: &[u8],
) -> Result<(), KernelError> {
    for (i, byte) in data.iter().enumerate() {
        let va = addr.add(i);
        let phys = space
            .translate(va)
            .ok_or_else(|| KernelError::from(SyscallError::BadPointer))?;
        let byte_ptr = phys_to_virt_for_zeroing(phys).as_u64() as *mut u8;
        // SAFETY: same as `copy_from_user`, writable because every user
        // data/stack/heap mapping carries `PageFlags::WRITABLE`.
        unsafe { byte_ptr.write(*byte) };
    }
    Ok(())
}
