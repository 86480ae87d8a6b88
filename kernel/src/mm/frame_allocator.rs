//! Bitmap physical memory manager.
//!
//! One bit per 4 KiB frame: 1 = free, 0 = in use (allocated or reserved).
//! `free_count + reserved_count + used_count == total_count` is maintained
//! as an invariant after every operation and checked by the diagnostic
//! accessor used by the `/proc`-style memory report.

#![allow(dead_code)]

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::error::{KernelError, MmError};

pub const FRAME_SIZE: usize = 4096;

/// Supports up to 4 GiB of physical memory (1M frames / 64 per word).
const MAX_FRAMES: usize = 1 << 20;
const BITMAP_WORDS: usize = MAX_FRAMES / 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(u64);

impl FrameNumber {
    pub const fn new(num: u64) -> Self {
        Self(num)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_addr(&self) -> super::PhysicalAddress {
        super::PhysicalAddress::new(self.0 * FRAME_SIZE as u64)
    }

    pub const fn from_addr(addr: super::PhysicalAddress) -> Self {
        Self(addr.as_u64() / FRAME_SIZE as u64)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStats {
    pub total_count: usize,
    pub free_count: usize,
    pub reserved_count: usize,
    pub used_count: usize,
}

struct Bitmap {
    words: [u64; BITMAP_WORDS],
    total_count: usize,
    free_count: usize,
    reserved_count: usize,
}

impl Bitmap {
    const fn empty() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
            total_count: 0,
            free_count: 0,
            reserved_count: 0,
        }
    }

    fn set_free(&mut self, frame: usize, free: bool) {
        let word = frame / 64;
        let bit = frame % 64;
        if free {
            self.words[word] |= 1 << bit;
        } else {
            self.words[word] &= !(1u64 << bit);
        }
    }

    fn is_free(&self, frame: usize) -> bool {
        (self.words[frame / 64] >> (frame % 64)) & 1 != 0
    }
}

/// A contiguous usable physical range reported by the bootloader's memory map.
#[derive(Debug, Clone, Copy)]
pub struct UsableRegion {
    pub start_frame: u64,
    pub frame_count: u64,
}

pub struct FrameAllocator {
    bitmap: Mutex<Bitmap>,
    used_count: AtomicUsize,
}

impl FrameAllocator {
    pub const fn new() -> Self {
        Self {
            bitmap: Mutex::new(Bitmap::empty()),
            used_count: AtomicUsize::new(0),
        }
    }

    /// Mark `regions` as free and everything else (including anything past
    /// the highest reported frame) as reserved. Must run exactly once,
    /// before any `alloc`/`free` call.
    pub fn init(&self, regions: &[UsableRegion]) {
        let mut bm = self.bitmap.lock();
        let total = regions
            .iter()
            .map(|r| r.start_frame + r.frame_count)
            .max()
            .unwrap_or(0)
            .min(MAX_FRAMES as u64) as usize;
        bm.total_count = total;
        bm.reserved_count = total;
        for region in regions {
            let start = region.start_frame as usize;
            let end = ((region.start_frame + region.frame_count) as usize).min(MAX_FRAMES);
            for frame in start..end {
                if !bm.is_free(frame) {
                    bm.set_free(frame, true);
                    bm.free_count += 1;
                    bm.reserved_count -= 1;
                }
            }
        }
    }

    /// Reserve a specific frame (e.g. one already holding the kernel image
    /// or an early boot page table) so the allocator never hands it out.
    pub fn reserve(&self, frame: FrameNumber) -> Result<(), KernelError> {
        let idx = frame.as_u64() as usize;
        let mut bm = self.bitmap.lock();
        if idx >= bm.total_count {
            return Err(MmError::InvalidAlignment.into());
        }
        if bm.is_free(idx) {
            bm.set_free(idx, false);
            bm.free_count -= 1;
            bm.reserved_count += 1;
        }
        Ok(())
    }

    pub fn alloc(&self) -> Result<FrameNumber, KernelError> {
        let mut bm = self.bitmap.lock();
        for word_idx in 0..BITMAP_WORDS {
            let word = bm.words[word_idx];
            if word == 0 {
                continue;
            }
            let bit = word.trailing_zeros() as usize;
            let frame = word_idx * 64 + bit;
            if frame >= bm.total_count {
                break;
            }
            bm.set_free(frame, false);
            bm.free_count -= 1;
            self.used_count.fetch_add(1, Ordering::Relaxed);
            return Ok(FrameNumber::new(frame as u64));
        }
        Err(MmError::NoFrame.into())
    }

    /// Allocate `count` physically contiguous frames (used for DMA-style
    /// buffers such as a block device's staging page).
    pub fn alloc_contiguous(&self, count: usize) -> Result<FrameNumber, KernelError> {
        if count == 0 {
            return Err(MmError::InvalidAlignment.into());
        }
        let mut bm = self.bitmap.lock();
        let mut run_start = None;
        let mut run_len = 0usize;
        for frame in 0..bm.total_count {
            if bm.is_free(frame) {
                if run_start.is_none() {
                    run_start = Some(frame);
                }
                run_len += 1;
                if run_len == count {
                    let start = run_start.unwrap();
                    for f in start..start + count {
                        bm.set_free(f, false);
                    }
                    bm.free_count -= count;
                    self.used_count.fetch_add(count, Ordering::Relaxed);
                    return Ok(FrameNumber::new(start as u64));
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
        Err(MmError::NoFrame.into())
    }

    pub fn free(&self, frame: FrameNumber) -> Result<(), KernelError> {
        self.free_contiguous(frame, 1)
    }

    pub fn free_contiguous(&self, frame: FrameNumber, count: usize) -> Result<(), KernelError> {
        let start = frame.as_u64() as usize;
        let mut bm = self.bitmap.lock();
        if start + count > bm.total_count {
            return Err(MmError::InvalidAlignment.into());
        }
        for f in start..start + count {
            if bm.is_free(f) {
                // Double free: treat as corruption rather than silently
                // double-counting free_count.
                return Err(MmError::HeapCorrupt.into());
            }
            bm.set_free(f, true);
        }
        bm.free_count += count;
        self.used_count.fetch_sub(count, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> MemoryStats {
        let bm = self.bitmap.lock();
        MemoryStats {
            total_count: bm.total_count,
            free_count: bm.free_count,
            reserved_count: bm.reserved_count,
            used_count: self.used_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

pub static FRAME_ALLOCATOR: FrameAllocator = FrameAllocator::new();

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn fresh() -> FrameAllocator {
        let fa = FrameAllocator::new();
        fa.init(&[UsableRegion {
            start_frame: 0,
            frame_count: 64,
        }]);
        fa
    }

    #[test]
    fn alloc_then_free_restores_count() {
        let fa = fresh();
        let before = fa.stats();
        let frame = fa.alloc().unwrap();
        assert_eq!(fa.stats().free_count, before.free_count - 1);
        fa.free(frame).unwrap();
        assert_eq!(fa.stats().free_count, before.free_count);
    }

    #[test]
    fn conservation_invariant_holds() {
        let fa = fresh();
        for _ in 0..10 {
            fa.alloc().unwrap();
        }
        let s = fa.stats();
        assert_eq!(s.free_count + s.reserved_count + s.used_count, s.total_count);
    }

    #[test]
    fn contiguous_allocation_returns_adjacent_frames() {
        let fa = fresh();
        let start = fa.alloc_contiguous(4).unwrap();
        assert_eq!(start.as_u64(), 0);
        fa.free_contiguous(start, 4).unwrap();
    }

    #[test]
    fn exhausted_allocator_returns_no_frame() {
        let fa = FrameAllocator::new();
        fa.init(&[UsableRegion {
            start_frame: 0,
            frame_count: 1,
        }]);
        fa.alloc().unwrap();
        assert!(fa.alloc().is_err());
    }
}
