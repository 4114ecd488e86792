//! Shared fixture delegates for the adapter test suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use finderfs::{
    Capabilities, Delegate, FileHandle, FsError, FsResult, ItemAttributes, MountConfig,
};

/// The minimal delegate from the adapter's contract tests: serves `/` as a
/// directory holding one regular file `/hello` with contents `"Hi"` and a
/// 4-byte custom icon attached to `/hello`. A root icon is optional.
pub struct HelloDelegate {
    caps: Capabilities,
    root_icon: bool,
}

impl HelloDelegate {
    pub fn new() -> Self {
        Self {
            caps: Capabilities::LIST_DIRECTORY
                | Capabilities::ITEM_ATTRIBUTES
                | Capabilities::CONTENTS_AT_PATH
                | Capabilities::ICON_DATA,
            root_icon: false,
        }
    }

    /// Attach the icon to the root directory as well.
    pub fn with_root_icon(mut self) -> Self {
        self.root_icon = true;
        self
    }

    /// Extend the capability set.
    pub fn with_caps(mut self, caps: Capabilities) -> Self {
        self.caps |= caps;
        self
    }
}

impl Delegate for HelloDelegate {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn contents_of_directory(&self, path: &str) -> FsResult<Vec<String>> {
        if path == "/" {
            Ok(vec!["hello".to_string()])
        } else {
            Err(FsError::NotFound)
        }
    }

    fn attributes_of_item(&self, path: &str) -> FsResult<ItemAttributes> {
        match path {
            "/" => Ok(ItemAttributes::directory()),
            "/hello" => Ok(ItemAttributes::regular(2)),
            _ => Err(FsError::NotFound),
        }
    }

    fn contents_at_path(&self, path: &str) -> FsResult<Option<Vec<u8>>> {
        Ok((path == "/hello").then(|| b"Hi".to_vec()))
    }

    fn icon_data(&self, path: &str) -> Option<Vec<u8>> {
        if path == "/hello" || (self.root_icon && path == "/") {
            Some(b"ICON".to_vec())
        } else {
            None
        }
    }
}

/// Counters observing the open/release lifecycle of delegate handles.
#[derive(Default)]
pub struct HandleCounters {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

struct CountedHandle {
    bytes: Vec<u8>,
}

impl FileHandle for CountedHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let start = offset as usize;
        if start >= self.bytes.len() {
            return Ok(0);
        }
        let end = (start + buf.len()).min(self.bytes.len());
        buf[..end - start].copy_from_slice(&self.bytes[start..end]);
        Ok(end - start)
    }
}

/// A delegate whose opens hand out counted handles, for lifecycle tests.
pub struct CountingDelegate {
    pub counters: Arc<HandleCounters>,
}

impl CountingDelegate {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(HandleCounters::default()),
        }
    }
}

impl Delegate for CountingDelegate {
    fn capabilities(&self) -> Capabilities {
        Capabilities::OPEN_FILE | Capabilities::RELEASE_FILE | Capabilities::ITEM_ATTRIBUTES
    }

    fn attributes_of_item(&self, path: &str) -> FsResult<ItemAttributes> {
        match path {
            "/" => Ok(ItemAttributes::directory()),
            "/counted" => Ok(ItemAttributes::regular(5)),
            _ => Err(FsError::NotFound),
        }
    }

    fn open_file(&self, path: &str, _flags: i32) -> FsResult<Box<dyn FileHandle>> {
        if path != "/counted" {
            return Err(FsError::NotFound);
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedHandle {
            bytes: b"bytes".to_vec(),
        }))
    }

    fn release_file(&self, _path: &str, _handle: Box<dyn FileHandle>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Config with the compat listing mode pinned, so tests are independent of
/// the host's FUSE installation.
pub fn compat_config(list_double_files: bool) -> MountConfig {
    MountConfig::default().list_double_files(list_double_files)
}
