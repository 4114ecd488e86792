//! Capability-probing wrapper around the delegate.
//!
//! Every high-level operation funnels through here. The facade checks the
//! delegate's capability bitset once per call and supplies the standard
//! fallback when the capability is missing, so the request translator never
//! needs to know what the delegate can or cannot do. It also owns the open
//! precedence and the synthetic listing augmentation, because both mix
//! delegate capabilities with synthesized content.

use std::sync::Arc;

use tracing::trace;

use crate::attr::{AttrPatch, FsAttributes, ItemAttributes};
use crate::delegate::{Capabilities, Delegate};
use crate::error::{FsError, FsResult};
use crate::handles::OpenHandle;
use crate::resolver::{self, VirtualEntity};
use crate::synthetic::SyntheticProvider;

/// Name of the synthesized FinderInfo extended attribute.
pub const XATTR_FINDER_INFO: &str = "com.apple.FinderInfo";

/// Name of the synthesized resource fork extended attribute.
pub const XATTR_RESOURCE_FORK: &str = "com.apple.ResourceFork";

pub(crate) struct DelegateFacade {
    delegate: Arc<dyn Delegate>,
    caps: Capabilities,
    synthetic: SyntheticProvider,
}

impl DelegateFacade {
    pub(crate) fn new(delegate: Arc<dyn Delegate>) -> Self {
        let caps = delegate.capabilities();
        let synthetic = SyntheticProvider::new(Arc::clone(&delegate), caps);
        Self {
            delegate,
            caps,
            synthetic,
        }
    }

    pub(crate) fn synthetic(&self) -> &SyntheticProvider {
        &self.synthetic
    }

    pub(crate) fn delegate(&self) -> &Arc<dyn Delegate> {
        &self.delegate
    }

    pub(crate) fn has_contents_at_path(&self) -> bool {
        self.caps.contains(Capabilities::CONTENTS_AT_PATH)
    }

    /// Delegate attributes for `path`; `None` when the capability is absent.
    pub(crate) fn delegate_attributes(&self, path: &str) -> FsResult<Option<ItemAttributes>> {
        if !self.caps.contains(Capabilities::ITEM_ATTRIBUTES) {
            return Ok(None);
        }
        self.delegate.attributes_of_item(path).map(Some)
    }

    pub(crate) fn contents_at_path(&self, path: &str) -> FsResult<Option<Vec<u8>>> {
        self.delegate.contents_at_path(path)
    }

    // ==================== Namespace mutations ====================

    pub(crate) fn move_item(&self, source: &str, destination: &str) -> FsResult<()> {
        if !self.caps.contains(Capabilities::MOVE_ITEM) {
            return Err(FsError::PermissionDenied);
        }
        self.delegate.move_item(source, destination)
    }

    pub(crate) fn remove_item(&self, path: &str) -> FsResult<()> {
        if !self.caps.contains(Capabilities::REMOVE_ITEM) {
            return Err(FsError::PermissionDenied);
        }
        self.delegate.remove_item(path)
    }

    pub(crate) fn create_directory(&self, path: &str, mode: u32) -> FsResult<()> {
        if !self.caps.contains(Capabilities::CREATE_DIRECTORY) {
            return Err(FsError::PermissionDenied);
        }
        self.delegate.create_directory(path, mode)
    }

    pub(crate) fn create_file(&self, path: &str, mode: u32) -> FsResult<OpenHandle> {
        if !self.caps.contains(Capabilities::CREATE_FILE) {
            return Err(FsError::PermissionDenied);
        }
        let handle = self.delegate.create_file(path, mode)?;
        Ok(OpenHandle::Delegate {
            path: path.to_string(),
            handle,
        })
    }

    pub(crate) fn link_item(&self, path: &str, other: &str) -> FsResult<()> {
        if !self.caps.contains(Capabilities::LINK_ITEM) {
            return Err(FsError::NotSupported);
        }
        self.delegate.link_item(path, other)
    }

    pub(crate) fn create_symlink(&self, path: &str, target: &str) -> FsResult<()> {
        if !self.caps.contains(Capabilities::CREATE_SYMLINK) {
            return Err(FsError::NotSupported);
        }
        self.delegate.create_symlink(path, target)
    }

    pub(crate) fn destination_of_symlink(&self, path: &str) -> FsResult<String> {
        if !self.caps.contains(Capabilities::READ_SYMLINK) {
            return Err(FsError::NotFound);
        }
        self.delegate.destination_of_symlink(path)
    }

    // ==================== Open / IO ====================

    /// Opens `path`, synthetic entities first.
    ///
    /// Precedence: a directory-icon slot opens as an empty buffer; a sidecar
    /// opens as its synthesized bytes (and fails with `ENOENT` when there is
    /// nothing to synthesize); then `contents_at_path` when it yields bytes;
    /// then the delegate's own `open_file`; otherwise `ENOENT`.
    pub(crate) fn open(&self, path: &str, flags: i32) -> FsResult<OpenHandle> {
        let resolved = resolver::resolve(path);
        match resolved.entity {
            VirtualEntity::DirectoryIcon => Ok(OpenHandle::Buffer {
                path: path.to_string(),
                bytes: Vec::new(),
            }),
            VirtualEntity::AppleDouble => match self.synthetic.apple_double(&resolved.real) {
                Some(bytes) => Ok(OpenHandle::Buffer {
                    path: path.to_string(),
                    bytes,
                }),
                None => Err(FsError::NotFound),
            },
            VirtualEntity::Ordinary => {
                if self.caps.contains(Capabilities::CONTENTS_AT_PATH) {
                    if let Some(bytes) = self.delegate.contents_at_path(path)? {
                        return Ok(OpenHandle::Buffer {
                            path: path.to_string(),
                            bytes,
                        });
                    }
                }
                if self.caps.contains(Capabilities::OPEN_FILE) {
                    let handle = self.delegate.open_file(path, flags)?;
                    return Ok(OpenHandle::Delegate {
                        path: path.to_string(),
                        handle,
                    });
                }
                Err(FsError::NotFound)
            }
        }
    }

    /// Returns a released handle to the delegate. Buffers are simply dropped.
    pub(crate) fn release(&self, handle: OpenHandle) {
        match handle {
            OpenHandle::Buffer { path, .. } => {
                trace!(path, "released buffer handle");
            }
            OpenHandle::Delegate { path, handle } => {
                if self.caps.contains(Capabilities::RELEASE_FILE) {
                    self.delegate.release_file(&path, handle);
                }
            }
        }
    }

    /// Reads through the handle, falling back to the path-addressed read.
    pub(crate) fn read(
        &self,
        handle: &mut OpenHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> FsResult<usize> {
        match handle {
            OpenHandle::Buffer { bytes, .. } => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX);
                if start >= bytes.len() {
                    return Ok(0);
                }
                let end = (start + buf.len()).min(bytes.len());
                let n = end - start;
                buf[..n].copy_from_slice(&bytes[start..end]);
                Ok(n)
            }
            OpenHandle::Delegate { path, handle } => match handle.read_at(offset, buf) {
                Err(FsError::NotImplemented) => self.read_via_path(path, offset, buf),
                other => other,
            },
        }
    }

    fn read_via_path(&self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        if !self.caps.contains(Capabilities::READ_FILE) {
            return Err(FsError::PermissionDenied);
        }
        self.delegate.read_file(path, offset, buf)
    }

    /// Writes through the handle, falling back to the path-addressed write.
    pub(crate) fn write(
        &self,
        handle: &mut OpenHandle,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        match handle {
            OpenHandle::Buffer { path, .. } => self.write_via_path(path, offset, data),
            OpenHandle::Delegate { path, handle } => match handle.write_at(offset, data) {
                Err(FsError::NotImplemented) => self.write_via_path(path, offset, data),
                other => other,
            },
        }
    }

    fn write_via_path(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        if !self.caps.contains(Capabilities::WRITE_FILE) {
            return Err(FsError::PermissionDenied);
        }
        self.delegate.write_file(path, offset, data)
    }

    /// Truncates through the handle, falling back to the path-addressed call.
    pub(crate) fn truncate_handle(&self, handle: &mut OpenHandle, length: u64) -> FsResult<()> {
        match handle {
            OpenHandle::Buffer { path, .. } => self.truncate_path(path, length),
            OpenHandle::Delegate { path, handle } => match handle.truncate(length) {
                Err(FsError::NotImplemented) => self.truncate_path(path, length),
                other => other,
            },
        }
    }

    /// Path-addressed truncate used by `setattr` without an open handle.
    pub(crate) fn truncate_path(&self, path: &str, length: u64) -> FsResult<()> {
        if self.caps.contains(Capabilities::TRUNCATE_FILE) {
            return self.delegate.truncate_file(path, length);
        }
        // A delegate may route truncation through set_attributes instead.
        if self.caps.contains(Capabilities::SET_ATTRIBUTES) {
            let patch = AttrPatch {
                size: Some(length),
                ..AttrPatch::default()
            };
            return self.delegate.set_attributes(&patch, path);
        }
        Err(FsError::PermissionDenied)
    }

    // ==================== Listings ====================

    /// Directory listing with synthetic names appended in compat mode.
    ///
    /// An unimplemented listing capability leaves the root readable (an
    /// empty volume) but everything else absent.
    pub(crate) fn contents_of_directory(
        &self,
        path: &str,
        list_double_files: bool,
    ) -> FsResult<Vec<String>> {
        let mut names = if self.caps.contains(Capabilities::LIST_DIRECTORY) {
            self.delegate.contents_of_directory(path)?
        } else if path == "/" {
            Vec::new()
        } else {
            return Err(FsError::NotFound);
        };

        if list_double_files {
            self.synthetic.augment_listing(path, &mut names);
        }
        Ok(names)
    }

    // ==================== Attributes ====================

    pub(crate) fn set_attributes(&self, patch: &AttrPatch, path: &str) -> FsResult<()> {
        if !self.caps.contains(Capabilities::SET_ATTRIBUTES) {
            return Err(FsError::Posix(libc::ENODEV));
        }
        self.delegate.set_attributes(patch, path)
    }

    pub(crate) fn has_set_attributes(&self) -> bool {
        self.caps.contains(Capabilities::SET_ATTRIBUTES)
    }

    /// Filesystem statistics, defaulting to a 2 GiB volume.
    pub(crate) fn fs_attributes(&self, path: &str) -> FsResult<FsAttributes> {
        if !self.caps.contains(Capabilities::FS_ATTRIBUTES) {
            return Ok(FsAttributes::default());
        }
        self.delegate.attributes_of_file_system(path)
    }

    // ==================== Extended attributes ====================

    /// The value of `name` at `path`: delegate first, then the synthesized
    /// FinderInfo / ResourceFork attributes.
    pub(crate) fn xattr_value(&self, name: &str, path: &str) -> FsResult<Vec<u8>> {
        let mut delegate_err = None;
        if self.caps.contains(Capabilities::GET_XATTR) {
            match self.delegate.value_of_extended_attribute(name, path) {
                Ok(value) => return Ok(value),
                Err(e) => delegate_err = Some(e),
            }
        }

        if name == XATTR_FINDER_INFO {
            let resolved = resolver::resolve(path);
            let flags = if resolved.entity == VirtualEntity::DirectoryIcon {
                self.synthetic.finder_flags(&resolved.real, true)
            } else {
                self.synthetic.finder_flags(path, false)
            };
            return Ok(finderfs_appledouble::FinderInfo::with_flags(flags).to_bytes());
        }

        if name == XATTR_RESOURCE_FORK {
            let resolved = resolver::resolve(path);
            let real = if resolved.entity == VirtualEntity::DirectoryIcon {
                resolved.real
            } else {
                path.to_string()
            };
            return match self.synthetic.resource_fork(&real) {
                Some(bytes) => Ok(bytes),
                None => Err(FsError::AttributeNotFound),
            };
        }

        Err(delegate_err.unwrap_or(FsError::NotSupported))
    }

    pub(crate) fn xattr_names(&self, path: &str) -> FsResult<Vec<String>> {
        if !self.caps.contains(Capabilities::LIST_XATTR) {
            return Err(FsError::NotSupported);
        }
        self.delegate.extended_attributes_of_item(path)
    }

    pub(crate) fn set_xattr(&self, name: &str, path: &str, value: &[u8]) -> FsResult<()> {
        if !self.caps.contains(Capabilities::SET_XATTR) {
            return Err(FsError::NotSupported);
        }
        self.delegate.set_extended_attribute(name, path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;
    impl Delegate for Minimal {}

    fn facade(delegate: impl Delegate + 'static) -> DelegateFacade {
        DelegateFacade::new(Arc::new(delegate))
    }

    #[test]
    fn missing_capabilities_hit_the_fallback_table() {
        let f = facade(Minimal);
        assert!(matches!(
            f.move_item("/a", "/b"),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(f.remove_item("/a"), Err(FsError::PermissionDenied)));
        assert!(matches!(
            f.create_directory("/a", 0o755),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(
            f.create_file("/a", 0o644),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(f.link_item("/a", "/b"), Err(FsError::NotSupported)));
        assert!(matches!(
            f.create_symlink("/a", "t"),
            Err(FsError::NotSupported)
        ));
        assert!(matches!(
            f.destination_of_symlink("/a"),
            Err(FsError::NotFound)
        ));
        assert!(matches!(f.xattr_names("/a"), Err(FsError::NotSupported)));
        assert!(matches!(
            f.set_xattr("user.x", "/a", b"v"),
            Err(FsError::NotSupported)
        ));
        assert!(matches!(
            f.set_attributes(&AttrPatch::default(), "/a"),
            Err(FsError::Posix(code)) if code == libc::ENODEV
        ));
    }

    #[test]
    fn listing_without_capability_only_serves_the_root() {
        let f = facade(Minimal);
        assert_eq!(f.contents_of_directory("/", false).unwrap(), Vec::<String>::new());
        assert!(matches!(
            f.contents_of_directory("/sub", false),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn fs_attributes_default_without_capability() {
        let f = facade(Minimal);
        let stats = f.fs_attributes("/").unwrap();
        assert_eq!(stats, FsAttributes::default());
    }

    #[test]
    fn open_without_any_capability_is_absent() {
        let f = facade(Minimal);
        assert!(matches!(f.open("/x", libc::O_RDONLY), Err(FsError::NotFound)));
    }

    struct ContentsDelegate;
    impl Delegate for ContentsDelegate {
        fn capabilities(&self) -> Capabilities {
            Capabilities::CONTENTS_AT_PATH
        }
        fn contents_at_path(&self, path: &str) -> FsResult<Option<Vec<u8>>> {
            Ok((path == "/hello").then(|| b"Hi".to_vec()))
        }
    }

    #[test]
    fn open_prefers_contents_snapshot() {
        let f = facade(ContentsDelegate);
        let handle = f.open("/hello", libc::O_RDONLY).unwrap();
        match handle {
            OpenHandle::Buffer { bytes, .. } => assert_eq!(bytes, b"Hi"),
            OpenHandle::Delegate { .. } => panic!("expected buffer handle"),
        }
        assert!(matches!(f.open("/absent", libc::O_RDONLY), Err(FsError::NotFound)));
    }

    #[test]
    fn finder_info_xattr_synthesizes_without_delegate_xattrs() {
        let f = facade(Minimal);
        let value = f.xattr_value(XATTR_FINDER_INFO, "/anything").unwrap();
        assert_eq!(value.len(), 32);
        assert!(value.iter().all(|&b| b == 0));
    }

    #[test]
    fn resource_fork_xattr_absent_without_sources() {
        let f = facade(Minimal);
        assert!(matches!(
            f.xattr_value(XATTR_RESOURCE_FORK, "/x"),
            Err(FsError::AttributeNotFound)
        ));
    }

    #[test]
    fn unknown_xattr_is_unsupported() {
        let f = facade(Minimal);
        assert!(matches!(
            f.xattr_value("user.custom", "/x"),
            Err(FsError::NotSupported)
        ));
    }
}
