//! The delegate surface: the user-supplied filesystem behind the adapter.
//!
//! A delegate opts into functionality through its [`Capabilities`] bitset;
//! every method has a default body so implementors only write what they
//! support. The [facade](crate::facade) consults the bitset before calling,
//! so a default body is only ever reached when a delegate advertises a
//! capability it did not implement, hence the `NotImplemented` returns.
//!
//! All paths are absolute, `/`-separated and UTF-8; `"/"` is the root.

use bitflags::bitflags;

use crate::attr::{AttrPatch, FsAttributes, ItemAttributes};
use crate::error::{FsError, FsResult};

bitflags! {
    /// The optional operations a delegate implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u32 {
        /// `contents_of_directory`
        const LIST_DIRECTORY     = 1 << 0;
        /// `attributes_of_item`
        const ITEM_ATTRIBUTES    = 1 << 1;
        /// `attributes_of_file_system`
        const FS_ATTRIBUTES      = 1 << 2;
        /// `set_attributes`
        const SET_ATTRIBUTES     = 1 << 3;
        /// `contents_at_path`
        const CONTENTS_AT_PATH   = 1 << 4;
        /// `open_file`
        const OPEN_FILE          = 1 << 5;
        /// `release_file`
        const RELEASE_FILE       = 1 << 6;
        /// `read_file` (path-addressed reads)
        const READ_FILE          = 1 << 7;
        /// `write_file` (path-addressed writes)
        const WRITE_FILE         = 1 << 8;
        /// `truncate_file` (path-addressed truncation)
        const TRUNCATE_FILE      = 1 << 9;
        /// `create_file`
        const CREATE_FILE        = 1 << 10;
        /// `create_directory`
        const CREATE_DIRECTORY   = 1 << 11;
        /// `move_item`
        const MOVE_ITEM          = 1 << 12;
        /// `remove_item` (files and directories)
        const REMOVE_ITEM        = 1 << 13;
        /// `link_item`
        const LINK_ITEM          = 1 << 14;
        /// `create_symlink`
        const CREATE_SYMLINK     = 1 << 15;
        /// `destination_of_symlink`
        const READ_SYMLINK       = 1 << 16;
        /// `extended_attributes_of_item`
        const LIST_XATTR         = 1 << 17;
        /// `value_of_extended_attribute`
        const GET_XATTR          = 1 << 18;
        /// `set_extended_attribute`
        const SET_XATTR          = 1 << 19;
        /// `finder_flags`
        const FINDER_FLAGS       = 1 << 20;
        /// `icon_data`
        const ICON_DATA          = 1 << 21;
        /// `webloc_url`
        const WEBLOC_URL         = 1 << 22;
    }
}

/// An open file produced by a delegate.
///
/// The adapter owns the handle from `open`/`create` until the matching
/// `release`, at which point ownership returns to the delegate through
/// [`Delegate::release_file`]. A handle may implement any subset of the
/// positional operations; for the rest the facade falls back to the
/// delegate's path-addressed methods.
pub trait FileHandle: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let _ = (offset, buf);
        Err(FsError::NotImplemented)
    }

    /// Writes `data` at `offset`, returning the number of bytes written.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FsResult<usize> {
        let _ = (offset, data);
        Err(FsError::NotImplemented)
    }

    /// Truncates (or extends) the file to `length` bytes.
    fn truncate(&mut self, length: u64) -> FsResult<()> {
        let _ = length;
        Err(FsError::NotImplemented)
    }
}

/// The user-supplied filesystem implementation.
///
/// Methods may block indefinitely; the adapter imposes no timeouts. A
/// delegate that is not thread-safe (the default) is served by a
/// single-threaded event loop.
#[allow(unused_variables)]
pub trait Delegate: Send + Sync {
    /// The operations this delegate implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Whether callbacks may be dispatched from multiple threads at once.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// Called immediately before the event loop starts.
    fn will_mount(&self) {}

    /// Called when the kernel tears the mount down, before the status flips
    /// to unmounting.
    fn will_unmount(&self) {}

    /// Lists the names in a directory (no `.`/`..`, no synthetic entries).
    fn contents_of_directory(&self, path: &str) -> FsResult<Vec<String>> {
        Err(FsError::NotImplemented)
    }

    /// Attributes of the item at `path`.
    fn attributes_of_item(&self, path: &str) -> FsResult<ItemAttributes> {
        Err(FsError::NotImplemented)
    }

    /// Whole-filesystem statistics for the volume containing `path`.
    fn attributes_of_file_system(&self, path: &str) -> FsResult<FsAttributes> {
        Err(FsError::NotImplemented)
    }

    /// Applies an attribute patch (chmod / chown / utimes / truncate).
    fn set_attributes(&self, patch: &AttrPatch, path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// The full contents of the file at `path`, or `None` when the item
    /// exists only through some other capability.
    fn contents_at_path(&self, path: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Opens the file at `path` with raw `open(2)` flags.
    fn open_file(&self, path: &str, flags: i32) -> FsResult<Box<dyn FileHandle>> {
        Err(FsError::NotImplemented)
    }

    /// Takes an open handle back after the kernel's final release.
    fn release_file(&self, path: &str, handle: Box<dyn FileHandle>) {}

    /// Path-addressed read, used when a handle has no `read_at`.
    fn read_file(&self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        Err(FsError::NotImplemented)
    }

    /// Path-addressed write, used when a handle has no `write_at`.
    fn write_file(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        Err(FsError::NotImplemented)
    }

    /// Path-addressed truncate, used when a handle has no `truncate`.
    fn truncate_file(&self, path: &str, length: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Creates a new file and opens it.
    fn create_file(&self, path: &str, mode: u32) -> FsResult<Box<dyn FileHandle>> {
        Err(FsError::NotImplemented)
    }

    /// Creates a directory.
    fn create_directory(&self, path: &str, mode: u32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Moves or renames an item. The delegate is responsible for recursion.
    fn move_item(&self, source: &str, destination: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Removes a file or directory.
    fn remove_item(&self, path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Creates a hard link at `path` pointing to `other`.
    fn link_item(&self, path: &str, other: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Creates a symlink at `path` with the given target.
    fn create_symlink(&self, path: &str, target: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Reads the target of the symlink at `path`.
    fn destination_of_symlink(&self, path: &str) -> FsResult<String> {
        Err(FsError::NotImplemented)
    }

    /// Names of the extended attributes on the item at `path`.
    fn extended_attributes_of_item(&self, path: &str) -> FsResult<Vec<String>> {
        Err(FsError::NotImplemented)
    }

    /// The value of one extended attribute.
    fn value_of_extended_attribute(&self, name: &str, path: &str) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    /// Sets one extended attribute.
    fn set_extended_attribute(&self, name: &str, path: &str, value: &[u8]) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Finder flags for `path`, OR'd into the synthesized flags word.
    fn finder_flags(&self, path: &str) -> u16 {
        0
    }

    /// Raw `.icns` data for a custom icon on `path`, if any.
    fn icon_data(&self, path: &str) -> Option<Vec<u8>> {
        None
    }

    /// The URL stored in the `.webloc` file at `path`, if any.
    fn webloc_url(&self, path: &str) -> Option<String> {
        None
    }
}

/// A [`FileHandle`] over an in-memory byte buffer.
///
/// Used for files whose whole contents are available up front: a delegate
/// can return one from `open_file`, and the adapter uses the same type for
/// synthetic sidecars.
#[derive(Debug, Default)]
pub struct BufferHandle {
    bytes: Vec<u8>,
}

impl BufferHandle {
    /// Wraps a byte buffer.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The current buffer contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl FileHandle for BufferHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.bytes.len() {
            return Ok(0);
        }
        let end = (start + buf.len()).min(self.bytes.len());
        let n = end - start;
        buf[..n].copy_from_slice(&self.bytes[start..end]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_handle_reads_in_range() {
        let mut h = BufferHandle::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        assert_eq!(h.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn buffer_handle_read_past_end_is_empty() {
        let mut h = BufferHandle::new(b"hi".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(h.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(h.read_at(0, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");
    }

    #[test]
    fn buffer_handle_rejects_writes_by_default() {
        let mut h = BufferHandle::new(Vec::new());
        assert!(matches!(
            h.write_at(0, b"x"),
            Err(FsError::NotImplemented)
        ));
        assert!(matches!(h.truncate(0), Err(FsError::NotImplemented)));
    }

    #[test]
    fn default_delegate_has_no_capabilities() {
        struct Bare;
        impl Delegate for Bare {}
        let d = Bare;
        assert!(d.capabilities().is_empty());
        assert!(!d.is_thread_safe());
        assert_eq!(d.finder_flags("/x"), 0);
        assert!(d.icon_data("/x").is_none());
    }
}
