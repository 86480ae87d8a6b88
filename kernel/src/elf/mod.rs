//! ELF64 loader (spec §4.10): x86_64 executables only, no dynamic linking,
//! no relocations, no interpreter lookup -- all out of scope (spec §1).
//!
//! `load` maps a fresh image for `process_create`. `load_copy` is the fork
//! variant: file-backed bytes are re-read from disk exactly as `load` does,
//! but any page byte range outside `p_filesz` (BSS) is copied from the
//! parent's already-mapped data pages instead of left zeroed, so a forked
//! child observes the parent's BSS contents at the moment of `fork` (spec
//! §8 scenario C, §4.10).

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{FsError, KernelError};
use crate::fs::{self, OpenAction};
use crate::mm::frame_allocator::{FrameNumber, FRAME_SIZE};
use crate::mm::page_table::{phys_to_virt_for_zeroing, AddressSpace, PageFlags};
use crate::mm::VirtualAddress;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Header {
    ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

const HEADER_SIZE: usize = core::mem::size_of::<Elf64Header>();
const PHDR_SIZE: usize = core::mem::size_of::<Elf64ProgramHeader>();

fn parse_header(bytes: &[u8]) -> Result<Elf64Header, KernelError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FsError::Corrupt.into());
    }
    // SAFETY: `Elf64Header` is `repr(C)` with no padding-sensitive
    // invariants; `bytes` is known to be at least `HEADER_SIZE` long.
    let header = unsafe { (bytes.as_ptr() as *const Elf64Header).read_unaligned() };
    if header.ident[0..4] != ELF_MAGIC {
        return Err(FsError::Corrupt.into());
    }
    if header.ident[4] != ELFCLASS64 || header.ident[5] != ELFDATA2LSB {
        return Err(FsError::Corrupt.into());
    }
    if header.e_machine != EM_X86_64 {
        return Err(FsError::Corrupt.into());
    }
    // Every binary is loaded at a single fixed `PROCESS_VADDR` (see
    // `process::PROCESS_VADDR`'s doc comment); a real `ET_DYN` PIE carries
    // relative addends this loader never applies, so only `ET_EXEC` is
    // accepted.
    if header.e_type != ET_EXEC {
        return Err(FsError::Corrupt.into());
    }
    if header.e_phoff == 0 || header.e_phnum == 0 {
        return Err(FsError::Corrupt.into());
    }
    if header.e_entry < super::process::PROCESS_VADDR {
        return Err(FsError::Corrupt.into());
    }
    Ok(header)
}

fn read_whole_file(path: &str) -> Result<Vec<u8>, KernelError> {
    let (node, mount) = fs::vfs_open(path, OpenAction::Read)?;
    let size = node.lock().size as usize;
    let mut buf = vec![0u8; size];
    let mut total = 0;
    while total < size {
        let n = fs::read_file_node(mount, &node, &mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    buf.truncate(total);
    fs::vfs_close(mount, &node)?;
    Ok(buf)
}

fn program_headers(bytes: &[u8], header: &Elf64Header) -> Result<Vec<Elf64ProgramHeader>, KernelError> {
    let mut out = Vec::with_capacity(header.e_phnum as usize);
    for i in 0..header.e_phnum as usize {
        let off = header.e_phoff as usize + i * PHDR_SIZE;
        if off + PHDR_SIZE > bytes.len() {
            return Err(FsError::Corrupt.into());
        }
        // SAFETY: bounds checked above; repr(C), no invalid bit patterns.
        let ph = unsafe { (bytes[off..].as_ptr() as *const Elf64ProgramHeader).read_unaligned() };
        out.push(ph);
    }
    Ok(out)
}

fn segment_flags(p_flags: u32) -> PageFlags {
    let mut flags = PageFlags::PRESENT | PageFlags::USER;
    if p_flags & PF_W != 0 {
        flags |= PageFlags::WRITABLE;
    }
    if p_flags & PF_X == 0 {
        flags |= PageFlags::NO_EXECUTE;
    }
    flags
}

/// Result of loading an image: the validated entry point and every frame
/// backing a `PT_LOAD` segment, tagged with the virtual address it was
/// mapped at (fork needs both to copy page-wise).
pub struct LoadedImage {
    pub entry: u64,
    pub data_pages: Vec<(VirtualAddress, FrameNumber)>,
}

/// Load `path` into `space`, zeroing and mapping every `PT_LOAD` segment.
pub fn load(space: &AddressSpace, path: &str) -> Result<LoadedImage, KernelError> {
    load_impl(space, path, None)
}

/// Fork's loading mode: identical to [`load`], except BSS bytes (the part
/// of each page beyond `p_filesz`) are copied from `parent`'s mapping of the
/// same virtual address rather than left zero.
pub fn load_copy(space: &AddressSpace, path: &str, parent: &AddressSpace) -> Result<LoadedImage, KernelError> {
    load_impl(space, path, Some(parent))
}

fn load_impl(
    space: &AddressSpace,
    path: &str,
    parent: Option<&AddressSpace>,
) -> Result<LoadedImage, KernelError> {
    let bytes = read_whole_file(path)?;
    let header = parse_header(&bytes)?;
    let phdrs = program_headers(&bytes, &header)?;

    let mut data_pages = Vec::new();
    for ph in phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
        let page_base = ph.p_vaddr & !(FRAME_SIZE as u64 - 1);
        let page_offset_in_seg = ph.p_vaddr - page_base;
        let total_span = page_offset_in_seg + ph.p_memsz;
        let page_count = total_span.div_ceil(FRAME_SIZE as u64) as usize;
        let flags = segment_flags(ph.p_flags);

        for i in 0..page_count {
            let page_vaddr = VirtualAddress::new(page_base + (i as u64) * FRAME_SIZE as u64);
            let frame = crate::mm::alloc_frame()?;
            let virt_alias = phys_to_virt_for_zeroing(frame.as_addr());
            let page_ptr = virt_alias.as_u64() as *mut u8;
            // SAFETY: `frame` was just allocated and is not yet mapped
            // anywhere else; the direct-map alias covers all usable RAM.
            unsafe {
                core::ptr::write_bytes(page_ptr, 0, FRAME_SIZE);
            }

            let page_start_in_file_space = (i as u64) * FRAME_SIZE as u64;
            let file_copy_start = page_start_in_file_space.max(page_offset_in_seg);
            let file_copy_end = (page_start_in_file_space + FRAME_SIZE as u64)
                .min(page_offset_in_seg + ph.p_filesz);

            if file_copy_end > file_copy_start {
                let seg_rel_start = file_copy_start - page_offset_in_seg;
                let file_off = ph.p_offset + seg_rel_start;
                let len = (file_copy_end - file_copy_start) as usize;
                let page_rel_off = (file_copy_start - page_start_in_file_space) as usize;
                if (file_off as usize + len) <= bytes.len() {
                    // SAFETY: `page_rel_off + len <= FRAME_SIZE` by
                    // construction (`file_copy_end` never exceeds the page
                    // boundary above).
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            bytes[file_off as usize..].as_ptr(),
                            page_ptr.add(page_rel_off),
                            len,
                        );
                    }
                }
            }

            if let Some(parent_space) = parent {
                let bss_start = page_start_in_file_space.max(page_offset_in_seg + ph.p_filesz);
                let bss_end = page_start_in_file_space + FRAME_SIZE as u64;
                if bss_end > bss_start && bss_start < total_span + page_offset_in_seg {
                    let bss_vaddr = VirtualAddress::new(page_base + bss_start);
                    let len = (bss_end - bss_start).min(total_span - (bss_start - page_offset_in_seg)) as usize;
                    if let Some(parent_phys) = parent_space.translate(bss_vaddr) {
                        let parent_alias = phys_to_virt_for_zeroing(parent_phys);
                        let page_rel_off = (bss_start - page_start_in_file_space) as usize;
                        // SAFETY: both pages are direct-mapped and distinct
                        // (freshly allocated child frame vs. parent's
                        // existing frame); lengths are bounded by FRAME_SIZE.
                        unsafe {
                            core::ptr::copy_nonoverlapping(
                                parent_alias.as_u64() as *const u8,
                                page_ptr.add(page_rel_off),
                                len,
                            );
                        }
                    }
                }
            }

            space.map(page_vaddr, frame.as_addr(), flags)?;
            data_pages.push((page_vaddr, frame));
        }
    }

    Ok(LoadedImage {
        entry: header.e_entry,
        data_pages,
    })
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 64];
        assert!(parse_header(&bytes).is_err());
    }
}
