//! Error handling and errno mapping for the adapter.
//!
//! The kernel only ever sees POSIX errno values, so every error a delegate
//! can produce must land in that space before a callback returns. Errors
//! with an explicit errno pass through unchanged; everything else falls back
//! to the per-operation default owned by the request translator.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// `ENOATTR` for missing extended attributes. Linux never grew the BSD
/// constant and aliases it to `ENODATA`.
#[cfg(target_os = "macos")]
pub const ENOATTR: i32 = libc::ENOATTR;
/// `ENOATTR` for missing extended attributes. Linux never grew the BSD
/// constant and aliases it to `ENODATA`.
#[cfg(not(target_os = "macos"))]
pub const ENOATTR: i32 = libc::ENODATA;

/// `EFTYPE` for an inappropriate file type. Linux never grew the BSD
/// constant; its numeric value (79 on macOS/BSD) is reused directly.
#[cfg(target_os = "macos")]
pub const EFTYPE: i32 = libc::EFTYPE;
/// `EFTYPE` for an inappropriate file type. Linux never grew the BSD
/// constant; its numeric value (79 on macOS/BSD) is reused directly.
#[cfg(not(target_os = "macos"))]
pub const EFTYPE: i32 = 79;

/// Errors surfaced by delegates and by the adapter's own plumbing.
#[derive(Debug, Error)]
pub enum FsError {
    /// An explicit POSIX errno. Code 0 carries no information and is treated
    /// like a non-POSIX error by [`FsError::errno`].
    #[error("posix error {0}")]
    Posix(i32),

    /// The item does not exist.
    #[error("no such item")]
    NotFound,

    /// The delegate (or handle) refused the operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The operation is not supported by this filesystem.
    #[error("operation not supported")]
    NotSupported,

    /// The delegate does not implement the capability behind this operation.
    #[error("capability not implemented")]
    NotImplemented,

    /// The named extended attribute does not exist.
    #[error("no such extended attribute")]
    AttributeNotFound,

    /// IO error from a delegate that does real IO.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Anything else; translated to the operation's default errno.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// The errno for this error, when it has one.
    ///
    /// Returns `None` for errors outside the POSIX domain (including
    /// `Posix(0)`), which the translator replaces with the operation's
    /// default code.
    pub fn errno(&self) -> Option<i32> {
        match self {
            FsError::Posix(0) => None,
            FsError::Posix(code) => Some(*code),
            FsError::NotFound => Some(libc::ENOENT),
            FsError::PermissionDenied => Some(libc::EACCES),
            FsError::NotSupported => Some(libc::ENOTSUP),
            FsError::NotImplemented => None,
            FsError::AttributeNotFound => Some(ENOATTR),
            FsError::Io(e) => e.raw_os_error(),
            FsError::Other(_) => None,
        }
    }
}

/// Result alias used across the delegate surface.
pub type FsResult<T> = Result<T, FsError>;

/// Errors from the mount controller.
#[derive(Debug, Error)]
pub enum MountError {
    /// The FUSE event loop failed or exited before the handshake completed.
    #[error("mount failed: {0}")]
    SessionFailed(#[from] io::Error),

    /// The mount point does not exist.
    #[error("mount point does not exist: {0}")]
    MountPointNotFound(PathBuf),

    /// Mount was requested while the filesystem is not in `NotMounted`.
    #[error("filesystem is already mounted or mounting")]
    AlreadyMounted,

    /// Unmount was requested while the filesystem is not mounted.
    #[error("filesystem is not mounted")]
    NotMounted,

    /// The platform unmount utility failed.
    #[error("unmount failed: {0}")]
    UnmountFailed(String),
}
