//! User-space filesystem adapter for macFUSE.
//!
//! finderfs sits between the kernel's FUSE interface and a user-supplied
//! filesystem implementation (the [`Delegate`]), translating each kernel
//! request into a high-level path-addressed call and the reply back into
//! the stat buffers and errno codes the kernel expects. On top of the
//! plain translation it synthesizes the macOS Finder compatibility layer:
//! AppleDouble "`._`" sidecars, "`Icon\r`" directory-icon slots, Finder
//! flags, and the `com.apple.FinderInfo` / `com.apple.ResourceFork`
//! extended attributes. The delegate never has to know about any of it.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use finderfs::{Delegate, MountConfig, MountController};
//!
//! let delegate: Arc<dyn Delegate> = Arc::new(MyFilesystem::new());
//! let controller = Arc::new(MountController::new(
//!     delegate,
//!     "/Volumes/MyFS",
//!     MountConfig::default().volume_name("MyFS"),
//! ));
//! let session = Arc::clone(&controller).spawn_mount();
//! // ... the volume appears once the kernel handshake completes ...
//! controller.unmount()?;
//! session.join().unwrap()?;
//! ```
//!
//! A delegate opts into functionality through its [`Capabilities`] bitset;
//! everything it does not implement is answered with the standard POSIX
//! fallback. Lifecycle transitions (`did-mount`, `did-unmount`,
//! `mount-failed`) are posted to an [`EventSink`] supplied at construction.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attr;
pub mod config;
pub mod delegate;
pub mod error;
pub mod events;
mod facade;
pub mod filesystem;
mod handles;
pub mod handshake;
mod inode;
pub mod mount;
pub mod resolver;
mod synthetic;

pub use attr::{AttrPatch, FileKind, FsAttributes, ItemAttributes};
pub use config::{host_fuse_major_version, MountConfig};
pub use delegate::{BufferHandle, Capabilities, Delegate, FileHandle};
pub use error::{FsError, FsResult, MountError, ENOATTR};
pub use events::{ChannelSink, EventSink, LifecycleEvent, NullSink};
pub use facade::{XATTR_FINDER_INFO, XATTR_RESOURCE_FORK};
pub use filesystem::{FinderFs, Op};
pub use mount::{MountController, MountStatus};
pub use resolver::{Resolution, Resolved, VirtualEntity};

// Re-exported so delegates can speak the flag vocabulary without a direct
// dependency on the encoder crate.
pub use finderfs_appledouble::FinderFlags;
