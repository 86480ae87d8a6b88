//! Virtual File System: a tree of mount nodes rooted at `/`.
//!
//! A node exists for every path segment it takes to reach a mounted
//! filesystem -- some nodes are "real" mounts (they carry a `Filesystem`),
//! others are pure path scaffolding created on demand so a nested mount has
//! somewhere to attach. Path resolution walks the tree segment by segment
//! and hands whatever remains of the path, uncanonicalised relative to the
//! tree, to the last real mount it passed through.

#![allow(dead_code)]

pub mod devfs;
pub mod ramfs;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::error::{FsError, KernelError};

/// A slice of a physical block device at an LBA offset, produced by
/// partition-table scan. Concrete partition-table parsing is out of scope;
/// this is the shape `vfs_mount_blockdev` and a `Filesystem::test` operate
/// on.
#[derive(Debug, Clone, Copy)]
pub struct VirtualBlockDevice {
    pub device_index: usize,
    pub lba_offset: u64,
    pub lba_count: u64,
    pub partition_type: u8,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAction {
    /// Fail if the path does not already exist.
    Read,
    /// Fail if the path does not already exist.
    Write,
    /// Truncate an existing file to zero length.
    Clear,
    /// Create the path if absent.
    Create,
}

/// What a filesystem's `open` hands back: enough identity for subsequent
/// read/write/close calls plus the size the VFS needs for `seek(End, ...)`.
#[derive(Debug, Clone)]
pub struct OpenedFile {
    pub private: u64,
    pub size: u64,
}

/// The contract a concrete filesystem (FAT32, a synthetic device-filesystem)
/// implements. Concrete implementations are out of scope beyond the two
/// bundled here (`ramfs`, `devfs`); only this trait is.
pub trait Filesystem: Send + Sync {
    /// Called once when this filesystem is mounted. Returns an opaque
    /// per-mount cookie threaded through every subsequent call.
    fn init(&self, vbdev: Option<&VirtualBlockDevice>) -> Result<u64, KernelError>;

    /// Auto-detection probe used by `vfs_mount_blockdev`. Filesystems that
    /// are never auto-detected (ramfs, devfs) accept nothing.
    fn test(&self, _vbdev: &VirtualBlockDevice) -> bool {
        false
    }

    fn open(&self, cookie: u64, path: &str, action: OpenAction) -> Result<OpenedFile, KernelError>;
    fn close(&self, _cookie: u64, _path: &str, _file: &OpenedFile) -> Result<(), KernelError> {
        Ok(())
    }
    fn read(
        &self,
        cookie: u64,
        path: &str,
        file: &OpenedFile,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, KernelError>;
    fn write(
        &self,
        cookie: u64,
        path: &str,
        file: &OpenedFile,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize, KernelError>;
    /// Returns the name of child `index` (0-based) of `path`, or `None` once
    /// `index` runs past the last entry.
    fn readdir(&self, cookie: u64, path: &str, index: usize) -> Result<Option<String>, KernelError>;
    fn delete(&self, cookie: u64, path: &str) -> Result<(), KernelError>;
}

/// Arena index into the global mount tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountIndex(usize);

struct MountNode {
    segment: String,
    parent: Option<MountIndex>,
    children: Vec<MountIndex>,
    filesystem: Option<Arc<dyn Filesystem>>,
    cookie: u64,
}

/// A file node handed to a `Stream::File`: the path it was opened from, the
/// VFS-tracked offset, the size reported at open, and the filesystem's own
/// private identity for it.
pub struct FileNode {
    pub path: String,
    pub offset: u64,
    pub size: u64,
    local_path: String,
    opened: OpenedFile,
}

struct Vfs {
    nodes: Vec<MountNode>,
}

impl Vfs {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }
}

static MOUNTS: Mutex<Option<Vfs>> = Mutex::new(None);
static DETECT_REGISTRY: Mutex<Vec<Arc<dyn Filesystem>>> = Mutex::new(Vec::new());

/// Register a filesystem as a candidate for `vfs_mount_blockdev`'s
/// auto-detection probe. Does not mount anything by itself.
pub fn register_detectable(fs: Arc<dyn Filesystem>) {
    DETECT_REGISTRY.lock().push(fs);
}

/// Split a path on `/`, collapsing `.` and resolving `..` against the
/// segments collected so far. Fails if `..` would ascend above `/`.
fn canonicalize(path: &str) -> Result<Vec<String>, KernelError> {
    let mut out: Vec<String> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if out.pop().is_none() {
                    return Err(FsError::InvalidPath.into());
                }
            }
            other => out.push(other.to_string()),
        }
    }
    Ok(out)
}

/// Mount `fs` at `path`, creating intermediate path nodes on demand. The
/// root mount (`path == "/"`) must be established before any other mount.
pub fn vfs_mount_filesystem(fs: Arc<dyn Filesystem>, path: &str) -> Result<(), KernelError> {
    let segments = canonicalize(path)?;
    let mut guard = MOUNTS.lock();

    if guard.is_none() {
        if !segments.is_empty() {
            return Err(FsError::NoSuchMount.into());
        }
        let cookie = fs.init(None)?;
        let mut vfs = Vfs::new();
        vfs.nodes.push(MountNode {
            segment: "/".to_string(),
            parent: None,
            children: Vec::new(),
            filesystem: Some(fs),
            cookie,
        });
        *guard = Some(vfs);
        return Ok(());
    }

    let vfs = guard.as_mut().ok_or(FsError::NoSuchMount)?;
    let mut current = MountIndex(0);
    for seg in &segments {
        current = find_or_create_child(vfs, current, seg);
    }
    let cookie = fs.init(None)?;
    vfs.nodes[current.0].filesystem = Some(fs);
    vfs.nodes[current.0].cookie = cookie;
    Ok(())
}

/// Auto-detect a filesystem for `vbdev` by probing every registered
/// candidate's `test`, then mount the first that accepts it at `path`.
pub fn vfs_mount_blockdev(vbdev: VirtualBlockDevice, path: &str) -> Result<(), KernelError> {
    let candidates = DETECT_REGISTRY.lock();
    let fs = candidates
        .iter()
        .find(|fs| fs.test(&vbdev))
        .cloned()
        .ok_or(FsError::NoSuchMount)?;
    drop(candidates);

    let segments = canonicalize(path)?;
    let mut guard = MOUNTS.lock();
    let vfs = guard.as_mut().ok_or(FsError::NoSuchMount)?;
    let mut current = MountIndex(0);
    for seg in &segments {
        current = find_or_create_child(vfs, current, seg);
    }
    let cookie = fs.init(Some(&vbdev))?;
    vfs.nodes[current.0].filesystem = Some(fs);
    vfs.nodes[current.0].cookie = cookie;
    Ok(())
}

fn find_or_create_child(vfs: &mut Vfs, parent: MountIndex, segment: &str) -> MountIndex {
    if let Some(&child) = vfs.nodes[parent.0]
        .children
        .iter()
        .find(|&&c| vfs.nodes[c.0].segment == segment)
    {
        return child;
    }
    let idx = MountIndex(vfs.nodes.len());
    vfs.nodes.push(MountNode {
        segment: segment.to_string(),
        parent: Some(parent),
        children: Vec::new(),
        filesystem: None,
        cookie: 0,
    });
    vfs.nodes[parent.0].children.push(idx);
    idx
}

/// Walk the mount tree for `path`, returning the last real-mount ancestor
/// reached and the uncanonicalised remainder of the path relative to it.
fn resolve(path: &str) -> Result<(MountIndex, String), KernelError> {
    let segments = canonicalize(path)?;
    let guard = MOUNTS.lock();
    let vfs = guard.as_ref().ok_or(FsError::NoSuchMount)?;

    let mut current = MountIndex(0);
    let mut real: Option<(MountIndex, usize)> = None;
    if vfs.nodes[0].filesystem.is_some() {
        real = Some((current, 0));
    }

    let mut consumed = 0;
    for seg in &segments {
        let next = vfs.nodes[current.0]
            .children
            .iter()
            .copied()
            .find(|&c| vfs.nodes[c.0].segment == *seg);
        match next {
            Some(c) => {
                current = c;
                consumed += 1;
                if vfs.nodes[c.0].filesystem.is_some() {
                    real = Some((c, consumed));
                }
            }
            None => break,
        }
    }

    let (mount, depth) = real.ok_or(FsError::NoSuchMount)?;
    let local = segments[depth..].join("/");
    Ok((mount, local))
}

fn with_mount<R>(
    mount: MountIndex,
    f: impl FnOnce(&Arc<dyn Filesystem>, u64) -> Result<R, KernelError>,
) -> Result<R, KernelError> {
    let guard = MOUNTS.lock();
    let vfs = guard.as_ref().ok_or(FsError::NoSuchMount)?;
    let node = vfs.nodes.get(mount.0).ok_or(FsError::Corrupt)?;
    let fs = node.filesystem.as_ref().ok_or(FsError::Corrupt)?;
    f(fs, node.cookie)
}

/// Open `path`, returning the owning [`crate::stream::Stream::File`]
/// payload: a freshly allocated file node plus the mount it came from.
pub fn vfs_open(
    path: &str,
    action: OpenAction,
) -> Result<(Arc<Mutex<FileNode>>, MountIndex), KernelError> {
    let (mount, local) = resolve(path)?;
    let opened = with_mount(mount, |fs, cookie| fs.open(cookie, &local, action))?;
    let node = FileNode {
        path: path.to_string(),
        offset: 0,
        size: opened.size,
        local_path: local,
        opened,
    };
    Ok((Arc::new(Mutex::new(node)), mount))
}

pub fn vfs_close(mount: MountIndex, node: &Arc<Mutex<FileNode>>) -> Result<(), KernelError> {
    let n = node.lock();
    with_mount(mount, |fs, cookie| fs.close(cookie, &n.local_path, &n.opened))
}

pub fn read_file_node(
    mount: MountIndex,
    node: &Arc<Mutex<FileNode>>,
    buf: &mut [u8],
) -> Result<usize, KernelError> {
    let mut n = node.lock();
    let offset = n.offset;
    let read = with_mount(mount, |fs, cookie| {
        fs.read(cookie, &n.local_path, &n.opened, offset, buf)
    })?;
    n.offset += read as u64;
    Ok(read)
}

pub fn write_file_node(
    mount: MountIndex,
    node: &Arc<Mutex<FileNode>>,
    buf: &[u8],
) -> Result<usize, KernelError> {
    let mut n = node.lock();
    let offset = n.offset;
    let written = with_mount(mount, |fs, cookie| {
        fs.write(cookie, &n.local_path, &n.opened, offset, buf)
    })?;
    n.offset += written as u64;
    if n.offset > n.size {
        n.size = n.offset;
    }
    Ok(written)
}

pub fn vfs_readdir(path: &str, index: usize) -> Result<Option<String>, KernelError> {
    let (mount, local) = resolve(path)?;
    let entry = with_mount(mount, |fs, cookie| fs.readdir(cookie, &local, index))?;
    Ok(entry.map(|name| {
        let mut full = path.trim_end_matches('/').to_string();
        full.push('/');
        full.push_str(&name);
        full
    }))
}

pub fn vfs_delete(path: &str) -> Result<(), KernelError> {
    let (mount, local) = resolve(path)?;
    with_mount(mount, |fs, cookie| fs.delete(cookie, &local))
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::fs::ramfs::RamFs;

    fn fresh_root() {
        let mut guard = MOUNTS.lock();
        *guard = None;
        drop(guard);
        vfs_mount_filesystem(Arc::new(RamFs::new()), "/").unwrap();
    }

    #[test]
    fn canonicalize_dot_and_dotdot() {
        assert_eq!(
            canonicalize("/a/./b/../c").unwrap(),
            canonicalize("/a/c").unwrap()
        );
    }

    #[test]
    fn dotdot_above_root_fails() {
        assert!(canonicalize("/..").is_err());
    }

    #[test]
    fn root_must_mount_first() {
        let mut guard = MOUNTS.lock();
        *guard = None;
        drop(guard);
        let err = vfs_mount_filesystem(Arc::new(RamFs::new()), "/mnt");
        assert!(err.is_err());
    }

    #[test]
    fn open_write_read_round_trip() {
        fresh_root();
        let (node, mount) = vfs_open("/hello.txt", OpenAction::Create).unwrap();
        write_file_node(mount, &node, b"hi").unwrap();
        node.lock().offset = 0;
        let mut buf = [0u8; 2];
        let n = read_file_node(mount, &node, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf, b"hi");
    }
}
