//! The stream layer: one polymorphic I/O handle type behind every descriptor
//! slot (spec §4.5). A stream is one of four variants -- `Null`, `Pipe`,
//! `File`, `Driver` -- and every descriptor-table operation (`read`, `write`,
//! `clone`, `free`) dispatches on the variant rather than going through a
//! trait object, since there are exactly four shapes and they never grow a
//! fifth.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::device::DeviceHandle;
use crate::error::{FsError, KernelError};
use crate::fs::{FileNode, MountIndex};

/// Ring capacity is exactly one page; matches the source's choice of a
/// page-sized pipe buffer rather than a configurable size.
const RING_SIZE: usize = 4096;

/// Shared, reference-counted pipe ring. Every `Stream::Pipe` handle that
/// shares a ring holds an `Arc` to one of these; the ring itself is dropped
/// (by `Arc`'s own refcounting) when the last handle is freed, so there is
/// no explicit refcount field here -- `Arc::strong_count` already *is* the
/// refcount spec §4.5 describes.
struct PipeRing {
    buf: [u8; RING_SIZE],
    read_off: usize,
    write_off: usize,
}

impl PipeRing {
    fn new() -> Self {
        Self {
            buf: [0; RING_SIZE],
            read_off: 0,
            write_off: 0,
        }
    }

    fn available(&self) -> usize {
        (self.write_off + RING_SIZE - self.read_off) % RING_SIZE
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available());
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[self.read_off];
            self.read_off = (self.read_off + 1) % RING_SIZE;
        }
        n
    }

    /// Write as many bytes as fit before the ring catches up with the
    /// reader. On wraparound a sentinel zero byte is inserted at the wrap
    /// point and the write offset advances past it -- this is the source's
    /// documented "leaves artifacts" behaviour (spec §9 Open Questions);
    /// ported as-is rather than corrected.
    fn write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        for &byte in data {
            let next = (self.write_off + 1) % RING_SIZE;
            if next == self.read_off {
                // Ring full: insert the sentinel and stop accepting bytes
                // rather than overwriting unread data.
                self.buf[self.write_off] = 0;
                self.write_off = next;
                break;
            }
            self.buf[self.write_off] = byte;
            self.write_off = next;
            written += 1;
        }
        written
    }

    fn flush(&mut self) {
        self.read_off = self.write_off;
    }
}

/// A polymorphic I/O handle held in a process descriptor slot.
pub enum Stream {
    /// Reads return 0 bytes; writes fail with `Unavailable`.
    Null,
    /// Shared bidirectional ring buffer.
    Pipe(Arc<Mutex<PipeRing>>),
    /// A VFS file node plus the mount that produced it.
    File(Arc<Mutex<FileNode>>, MountIndex),
    /// A device-manager entry.
    Driver(DeviceHandle),
}

impl Stream {
    /// Allocate a fresh pipe ring and return the single stream handle that
    /// owns it; `clone` is how a second handle comes to share the same ring.
    pub fn new_pipe() -> Self {
        Stream::Pipe(Arc::new(Mutex::new(PipeRing::new())))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        match self {
            Stream::Null => Ok(0),
            Stream::Pipe(ring) => Ok(ring.lock().read(buf)),
            Stream::File(node, mount) => crate::fs::read_file_node(*mount, node, buf),
            Stream::Driver(handle) => handle.read(buf),
        }
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        match self {
            Stream::Null => Err(FsError::InvalidAction.into()),
            Stream::Pipe(ring) => Ok(ring.lock().write(buf)),
            Stream::File(node, mount) => crate::fs::write_file_node(*mount, node, buf),
            Stream::Driver(handle) => handle.write(buf),
        }
    }

    /// Pipes only: drop whatever is buffered by aligning the read offset to
    /// the write offset. A no-op for every other variant.
    pub fn flush(&self) {
        if let Stream::Pipe(ring) = self {
            ring.lock().flush();
        }
    }

    pub fn seek(&self, offset: i64, whence: SeekWhence) -> Result<u64, KernelError> {
        match self {
            Stream::File(node, _) => {
                let mut n = node.lock();
                let base = match whence {
                    SeekWhence::Set => 0i64,
                    SeekWhence::Add => n.offset as i64,
                    SeekWhence::End => n.size as i64,
                };
                let new_off = base
                    .checked_add(offset)
                    .ok_or(KernelError::from(crate::error::SyscallError::InvalidArgument))?;
                if new_off < 0 {
                    return Err(crate::error::SyscallError::InvalidArgument.into());
                }
                n.offset = new_off as u64;
                Ok(n.offset)
            }
            _ => Err(FsError::InvalidAction.into()),
        }
    }

    /// Duplicate this stream for a new descriptor slot: pipes share the ring
    /// (bump the `Arc` refcount), files reopen the same path fresh, drivers
    /// duplicate the handle.
    pub fn try_clone(&self) -> Result<Self, KernelError> {
        Ok(match self {
            Stream::Null => Stream::Null,
            Stream::Pipe(ring) => Stream::Pipe(ring.clone()),
            Stream::File(node, mount) => {
                let path = node.lock().path.clone();
                crate::fs::vfs_open(&path, crate::fs::OpenAction::Read)
                    .or_else(|_| crate::fs::vfs_open(&path, crate::fs::OpenAction::Write))
                    .map(|(node, mount)| Stream::File(node, mount))
                    .unwrap_or_else(|_| Stream::File(node.clone(), *mount))
            }
            Stream::Driver(handle) => Stream::Driver(*handle),
        })
    }

    /// Release whatever resource this stream owns. Pipes drop their `Arc`
    /// (releasing the ring once the last reference goes); files close
    /// through the VFS; drivers and null streams need nothing.
    pub fn close(self) {
        if let Stream::File(node, mount) = self {
            let _ = crate::fs::vfs_close(mount, &node);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Add,
    End,
}

/// Per-process descriptor table: 8 owned stream slots. Slots 0/1/2 are
/// conventionally stdin/stdout/stderr; an unused slot holds `Stream::Null`.
pub struct DescriptorTable {
    slots: Vec<Option<Stream>>,
}

pub const NUM_DESCRIPTORS: usize = 8;

impl DescriptorTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(NUM_DESCRIPTORS);
        for _ in 0..NUM_DESCRIPTORS {
            slots.push(Some(Stream::Null));
        }
        Self { slots }
    }

    /// Install `stream` in slot `index`, replacing (and closing) whatever
    /// was there. Used by `process_create` to seed slots 0/1/2 with null
    /// streams and by `exec` to carry stdio across the image replacement.
    pub fn install(&mut self, index: usize, stream: Stream) -> Result<(), KernelError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(KernelError::from(crate::error::ProcError::BadDescriptor))?;
        if let Some(old) = slot.take() {
            old.close();
        }
        *slot = Some(stream);
        Ok(())
    }

    /// Find the first empty (`Null`) slot, install `stream`, and return its
    /// index. Used by `open`/`pipe`.
    pub fn allocate(&mut self, stream: Stream) -> Result<usize, KernelError> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if matches!(slot, Some(Stream::Null)) {
                *slot = Some(stream);
                return Ok(i);
            }
        }
        Err(crate::error::ProcError::NoDescriptorSlot.into())
    }

    pub fn get(&self, index: usize) -> Result<&Stream, KernelError> {
        self.slots
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or(crate::error::ProcError::BadDescriptor.into())
    }

    /// Close slot `index` and reset it to the null stream.
    pub fn close(&mut self, index: usize) -> Result<(), KernelError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(KernelError::from(crate::error::ProcError::BadDescriptor))?;
        if let Some(stream) = slot.take() {
            stream.close();
        }
        *slot = Some(Stream::Null);
        Ok(())
    }

    /// Duplicate every slot for fork: pipes bump refcount, files reopen,
    /// drivers duplicate.
    pub fn clone_all(&self) -> Result<DescriptorTable, KernelError> {
        let mut out = Vec::with_capacity(NUM_DESCRIPTORS);
        for slot in &self.slots {
            let cloned = match slot {
                Some(stream) => Some(stream.try_clone()?),
                None => Some(Stream::Null),
            };
            out.push(cloned);
        }
        Ok(DescriptorTable { slots: out })
    }

    /// Move descriptor `src` from `self` into `dst`'s slot `dst_slot` by
    /// cloning it -- used by `exec` to carry the caller's stdio into the
    /// replacement image (spec §4.8).
    pub fn inherit_into(
        &self,
        src: usize,
        dst: &mut DescriptorTable,
        dst_slot: usize,
    ) -> Result<(), KernelError> {
        let stream = self.get(src)?.try_clone()?;
        dst.install(dst_slot, stream)
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DescriptorTable {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            if let Some(stream) = slot {
                stream.close();
            }
        }
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn pipe_round_trip() {
        let s = Stream::new_pipe();
        assert_eq!(s.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(s.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn pipe_clone_shares_ring() {
        let s = Stream::new_pipe();
        let dup = s.try_clone().unwrap();
        s.write(b"x").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(dup.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'x');
    }

    #[test]
    fn null_reads_zero_and_rejects_writes() {
        let s = Stream::Null;
        let mut buf = [0u8; 4];
        assert_eq!(s.read(&mut buf).unwrap(), 0);
        assert!(s.write(b"x").is_err());
    }

    #[test]
    fn descriptor_table_starts_all_null() {
        let table = DescriptorTable::new();
        for i in 0..NUM_DESCRIPTORS {
            assert!(matches!(table.get(i).unwrap(), Stream::Null));
        }
    }

    #[test]
    fn allocate_then_close_returns_to_null() {
        let mut table = DescriptorTable::new();
        let idx = table.allocate(Stream::new_pipe()).unwrap();
        table.close(idx).unwrap();
        assert!(matches!(table.get(idx).unwrap(), Stream::Null));
    }

    #[test]
    fn ring_wraparound_inserts_sentinel() {
        let mut ring = PipeRing::new();
        let filler = [1u8; RING_SIZE];
        let written = ring.write(&filler);
        // One slot is always left as the "full" sentinel distinguishing
        // full from empty, so at most RING_SIZE - 1 bytes are accepted
        // before the sentinel insertion consumes the last slot.
        assert!(written < RING_SIZE);
    }
}
