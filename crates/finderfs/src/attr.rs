//! Item and filesystem attributes, and the attribute assembler.
//!
//! Delegates describe items with [`ItemAttributes`], a sparse record the
//! assembler merges over adapter defaults. The assembler also resolves
//! synthetic paths (AppleDouble sidecars, `Icon\r` slots) so that `getattr`
//! agrees byte-for-byte with what `open` + `read` would serve.

use std::time::SystemTime;

use crate::error::{FsError, FsResult};
use crate::facade::DelegateFacade;
use crate::resolver::{self, VirtualEntity};

/// Entry type of a filesystem item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A directory.
    Directory,
    /// A regular file.
    Regular,
    /// A symbolic link.
    Symlink,
}

/// Sparse item attributes as returned by a delegate.
///
/// Every field is optional: the assembler fills in defaults for anything a
/// delegate does not supply. `created` is reported to the kernel in
/// `st_ctime`, mirroring long-standing adapter behavior even though POSIX
/// defines `st_ctime` as the inode change time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ItemAttributes {
    /// Entry type.
    pub kind: Option<FileKind>,
    /// Permission bits (the permission portion of the mode only).
    pub permissions: Option<u32>,
    /// Owning user id; defaults to the effective uid of the process.
    pub uid: Option<u32>,
    /// Owning group id; defaults to the effective gid of the process.
    pub gid: Option<u32>,
    /// Hard link count; 1 means "don't know".
    pub nlink: Option<u32>,
    /// Size in bytes; meaningful for non-directories.
    pub size: Option<u64>,
    /// Modification date (also reported as the access date).
    pub modified: Option<SystemTime>,
    /// Creation date.
    pub created: Option<SystemTime>,
}

impl ItemAttributes {
    /// Attributes describing a regular file of the given size.
    #[must_use]
    pub fn regular(size: u64) -> Self {
        Self {
            kind: Some(FileKind::Regular),
            size: Some(size),
            ..Self::default()
        }
    }

    /// Attributes describing a directory.
    #[must_use]
    pub fn directory() -> Self {
        Self {
            kind: Some(FileKind::Directory),
            ..Self::default()
        }
    }

    /// Overlays `other` on top of `self`: fields present in `other` win.
    fn merge(&mut self, other: &ItemAttributes) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(kind, permissions, uid, gid, nlink, size, modified, created);
    }
}

/// A partial attribute update passed to the delegate's `set_attributes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttrPatch {
    /// New permission bits.
    pub permissions: Option<u32>,
    /// New owner.
    pub uid: Option<u32>,
    /// New group.
    pub gid: Option<u32>,
    /// New file length (truncate / extend).
    pub size: Option<u64>,
    /// New modification date.
    pub modified: Option<SystemTime>,
    /// New creation date.
    pub created: Option<SystemTime>,
}

impl AttrPatch {
    /// True when the patch carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.size.is_none()
            && self.modified.is_none()
            && self.created.is_none()
    }
}

/// Whole-filesystem statistics for `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsAttributes {
    /// Total size in bytes.
    pub size: u64,
    /// Free size in bytes.
    pub free_size: u64,
    /// Total node count.
    pub nodes: u64,
    /// Free node count.
    pub free_nodes: u64,
}

/// 2 GiB, the adapter's stand-in when the delegate reports no statistics.
const DEFAULT_FS_SIZE: u64 = 2 * 1024 * 1024 * 1024;

impl Default for FsAttributes {
    fn default() -> Self {
        Self {
            size: DEFAULT_FS_SIZE,
            free_size: DEFAULT_FS_SIZE,
            nodes: DEFAULT_FS_SIZE,
            free_nodes: DEFAULT_FS_SIZE,
        }
    }
}

/// Permission bits seeded before any delegate input (r-xr-xr-x).
pub(crate) const DEFAULT_PERMISSIONS: u32 = 0o555;

/// Assembles the attributes visible at `path`, synthetic entities included.
///
/// Pipeline: seed defaults; resolve the AppleDouble then directory-icon
/// layers; fetch delegate overrides for the real path; then replace the
/// result wholesale for synthetic entities (an icon slot is an empty regular
/// file, a sidecar's size is the length of its encoded bytes). Finally the
/// size of plain files is backfilled from `contents_at_path` when the
/// delegate supplied none.
pub(crate) fn assemble(facade: &DelegateFacade, path: &str) -> FsResult<ItemAttributes> {
    let mut attrs = ItemAttributes {
        kind: Some(if path == "/" {
            FileKind::Directory
        } else {
            FileKind::Regular
        }),
        permissions: Some(DEFAULT_PERMISSIONS),
        nlink: Some(1),
        ..ItemAttributes::default()
    };

    // Peel the synthetic layers one at a time: "._Icon\r" resolves first to
    // the sidecar's target "Icon\r", then to the enclosing directory. A
    // sidecar whose target is itself "._"-prefixed stops after one strip.
    let first = resolver::resolve(path);
    let (is_double, after_double) = if first.entity == VirtualEntity::AppleDouble {
        (true, first.real)
    } else {
        (false, path.to_string())
    };
    let second = resolver::resolve(&after_double);
    let (is_icon, real) = if second.entity == VirtualEntity::DirectoryIcon {
        (true, second.real)
    } else {
        (false, after_double.clone())
    };

    match facade.delegate_attributes(&real) {
        Ok(Some(overrides)) => attrs.merge(&overrides),
        Ok(None) => {}
        Err(e) => return Err(e),
    }

    if is_icon && !is_double {
        // The icon slot itself: an empty regular file, present only when the
        // enclosing directory actually has a custom icon.
        if !facade.synthetic().has_custom_icon(&real) {
            return Err(FsError::NotFound);
        }
        attrs.kind = Some(FileKind::Regular);
        attrs.size = Some(0);
        return Ok(attrs);
    }

    if is_double {
        let Some(bytes) = facade.synthetic().apple_double(&after_double) else {
            return Err(FsError::NotFound);
        };
        attrs.kind = Some(FileKind::Regular);
        attrs.size = Some(bytes.len() as u64);
        return Ok(attrs);
    }

    if attrs.size.is_none()
        && attrs.kind != Some(FileKind::Directory)
        && facade.has_contents_at_path()
    {
        match facade.contents_at_path(&real)? {
            Some(contents) => attrs.size = Some(contents.len() as u64),
            None => return Err(FsError::NotFound),
        }
    }

    Ok(attrs)
}
