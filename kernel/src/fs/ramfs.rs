//! In-memory filesystem: the root filesystem mounted before any block
//! device is available. Each mount gets its own flat path->bytes table
//! (no real directory nodes -- `readdir` synthesizes entries by scanning
//! for paths one segment deeper than the one asked about).

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::error::{FsError, KernelError};
use crate::fs::{Filesystem, OpenAction, OpenedFile, VirtualBlockDevice};

static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

pub struct RamFs {
    mounts: Mutex<BTreeMap<u64, BTreeMap<String, Vec<u8>>>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for RamFs {
    fn init(&self, _vbdev: Option<&VirtualBlockDevice>) -> Result<u64, KernelError> {
        let cookie = NEXT_COOKIE.fetch_add(1, Ordering::Relaxed);
        self.mounts.lock().insert(cookie, BTreeMap::new());
        Ok(cookie)
    }

    fn open(&self, cookie: u64, path: &str, action: OpenAction) -> Result<OpenedFile, KernelError> {
        let mut mounts = self.mounts.lock();
        let table = mounts.get_mut(&cookie).ok_or(FsError::Corrupt)?;
        match action {
            OpenAction::Read | OpenAction::Write => {
                let data = table.get(path).ok_or(FsError::NotFound)?;
                Ok(OpenedFile {
                    private: 0,
                    size: data.len() as u64,
                })
            }
            OpenAction::Clear => {
                table.insert(path.to_string(), Vec::new());
                Ok(OpenedFile { private: 0, size: 0 })
            }
            OpenAction::Create => {
                let size = table.entry(path.to_string()).or_default().len() as u64;
                Ok(OpenedFile { private: 0, size })
            }
        }
    }

    fn read(
        &self,
        cookie: u64,
        path: &str,
        _file: &OpenedFile,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, KernelError> {
        let mounts = self.mounts.lock();
        let table = mounts.get(&cookie).ok_or(FsError::Corrupt)?;
        let data = table.get(path).ok_or(FsError::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(
        &self,
        cookie: u64,
        path: &str,
        _file: &OpenedFile,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize, KernelError> {
        let mut mounts = self.mounts.lock();
        let table = mounts.get_mut(&cookie).ok_or(FsError::Corrupt)?;
        let data = table.entry(path.to_string()).or_default();
        let start = offset as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn readdir(&self, cookie: u64, path: &str, index: usize) -> Result<Option<String>, KernelError> {
        let mounts = self.mounts.lock();
        let table = mounts.get(&cookie).ok_or(FsError::Corrupt)?;
        let prefix = if path.is_empty() {
            String::new()
        } else {
            alloc::format!("{path}/")
        };
        let mut seen = alloc::collections::BTreeSet::new();
        for key in table.keys() {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                if let Some(name) = rest.split('/').next() {
                    if !name.is_empty() {
                        seen.insert(name.to_string());
                    }
                }
            }
        }
        Ok(seen.into_iter().nth(index))
    }

    fn delete(&self, cookie: u64, path: &str) -> Result<(), KernelError> {
        let mut mounts = self.mounts.lock();
        let table = mounts.get_mut(&cookie).ok_or(FsError::Corrupt)?;
        table.remove(path).map(|_| ()).ok_or(FsError::NotFound.into())
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn create_then_write_then_read() {
        let fs = RamFs::new();
        let cookie = fs.init(None).unwrap();
        let file = fs.open(cookie, "a", OpenAction::Create).unwrap();
        fs.write(cookie, "a", &file, 0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = fs.read(cookie, "a", &file, 0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_missing_fails() {
        let fs = RamFs::new();
        let cookie = fs.init(None).unwrap();
        assert!(fs.open(cookie, "missing", OpenAction::Read).is_err());
    }

    #[test]
    fn readdir_lists_direct_children() {
        let fs = RamFs::new();
        let cookie = fs.init(None).unwrap();
        fs.open(cookie, "bin/sh", OpenAction::Create).unwrap();
        fs.open(cookie, "bin/ls", OpenAction::Create).unwrap();
        let first = fs.readdir(cookie, "bin", 0).unwrap();
        assert!(first.is_some());
    }
}
