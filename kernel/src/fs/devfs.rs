//! Synthetic device filesystem mounted at `/dev`, exposing one path per
//! live device as `<type><index>` (e.g. `blk0`, `kbd0`, `rng0`). `open`
//! resolves the path to a device-manager index; `read`/`write` delegate
//! straight to that device's operation vector.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::device::DeviceType;
use crate::error::{DevError, FsError, KernelError};
use crate::fs::{Filesystem, OpenAction, OpenedFile, VirtualBlockDevice};

static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

fn type_prefix(dtype: DeviceType) -> &'static str {
    match dtype {
        DeviceType::Block => "blk",
        DeviceType::Char => "char",
        DeviceType::Input => "kbd",
        DeviceType::Video => "vid",
        DeviceType::Rng => "rng",
        DeviceType::Net => "net",
    }
}

fn parse_node_name(name: &str) -> Option<(DeviceType, usize)> {
    for dtype in [
        DeviceType::Block,
        DeviceType::Char,
        DeviceType::Input,
        DeviceType::Video,
        DeviceType::Rng,
        DeviceType::Net,
    ] {
        let prefix = type_prefix(dtype);
        if let Some(rest) = name.strip_prefix(prefix) {
            if let Ok(index) = rest.parse::<usize>() {
                return Some((dtype, index));
            }
        }
    }
    None
}

pub struct DevFs {
    /// Per-mount list of node names, snapshotted once at init from whatever
    /// devices the device manager had registered by then.
    nodes: Mutex<alloc::collections::BTreeMap<u64, Vec<String>>>,
}

impl DevFs {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(alloc::collections::BTreeMap::new()),
        }
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for DevFs {
    fn init(&self, _vbdev: Option<&VirtualBlockDevice>) -> Result<u64, KernelError> {
        let cookie = NEXT_COOKIE.fetch_add(1, Ordering::Relaxed);
        let mut names = Vec::new();
        for dtype in [
            DeviceType::Block,
            DeviceType::Char,
            DeviceType::Input,
            DeviceType::Video,
            DeviceType::Rng,
            DeviceType::Net,
        ] {
            let mut i = 0;
            while crate::device::find_by_type_index(dtype, i).is_some() {
                names.push(alloc::format!("{}{}", type_prefix(dtype), i));
                i += 1;
            }
        }
        self.nodes.lock().insert(cookie, names);
        Ok(cookie)
    }

    fn open(&self, _cookie: u64, path: &str, _action: OpenAction) -> Result<OpenedFile, KernelError> {
        let (dtype, index) = parse_node_name(path).ok_or(FsError::NotFound)?;
        crate::device::find_by_type_index(dtype, index).ok_or(FsError::NotFound)?;
        Ok(OpenedFile { private: 0, size: 0 })
    }

    fn read(
        &self,
        _cookie: u64,
        path: &str,
        _file: &OpenedFile,
        _offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, KernelError> {
        let (dtype, index) = parse_node_name(path).ok_or(FsError::NotFound)?;
        let device_index = crate::device::find_by_type_index(dtype, index).ok_or(FsError::NotFound)?;
        crate::device::with_device(device_index, |d| d.ops().read(buf))
            .ok_or(DevError::NotFound)?
    }

    fn write(
        &self,
        _cookie: u64,
        path: &str,
        _file: &OpenedFile,
        _offset: u64,
        buf: &[u8],
    ) -> Result<usize, KernelError> {
        let (dtype, index) = parse_node_name(path).ok_or(FsError::NotFound)?;
        let device_index = crate::device::find_by_type_index(dtype, index).ok_or(FsError::NotFound)?;
        crate::device::with_device(device_index, |d| d.ops().write(buf))
            .ok_or(DevError::NotFound)?
    }

    fn readdir(&self, cookie: u64, path: &str, index: usize) -> Result<Option<String>, KernelError> {
        if !path.is_empty() {
            return Ok(None);
        }
        let nodes = self.nodes.lock();
        let names = nodes.get(&cookie).ok_or(FsError::Corrupt)?;
        Ok(names.get(index).cloned())
    }

    fn delete(&self, _cookie: u64, _path: &str) -> Result<(), KernelError> {
        Err(FsError::InvalidAction.into())
    }
}

#[allow(dead_code)]
fn _keep_to_string_import(s: &str) -> String {
    s.to_string()
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn parses_node_names() {
        assert_eq!(parse_node_name("blk0"), Some((DeviceType::Block, 0)));
        assert_eq!(parse_node_name("kbd1"), Some((DeviceType::Input, 1)));
        assert_eq!(parse_node_name("bogus"), None);
    }
}
