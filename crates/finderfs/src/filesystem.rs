//! The request translator: kernel callbacks in, delegate calls out.
//!
//! [`FinderFs`] implements the fuser `Filesystem` trait over the
//! path-addressed [facade](crate::facade). Each callback is a thin shell:
//! resolve the inode to a path, run the errno-level inner method inside a
//! panic boundary, reply. The inner methods return `Result<T, c_int>` so
//! the whole translation core is exercisable without a kernel.
//!
//! Error discipline: a delegate error with an errno passes through
//! unchanged; anything else, including a panicking delegate, becomes the
//! operation's default code from the table in [`Op`].

use std::ffi::OsStr;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use tracing::{debug, error, info, trace, warn};

use crate::attr::{self, AttrPatch, FileKind, ItemAttributes};
use crate::config::MountConfig;
use crate::delegate::Delegate;
use crate::error::{FsError, ENOATTR, EFTYPE};
use crate::events::{EventSink, LifecycleEvent};
use crate::facade::DelegateFacade;
use crate::handles::HandleTable;
use crate::handshake;
use crate::inode::{InodeTable, ROOT_INODE};
use crate::mount::MountStatus;
use crate::resolver;

/// Block size reported through `statfs` (`f_bsize` and `f_frsize`).
const BLOCK_SIZE: u32 = 4096;

/// Maximum file name length reported through `statfs`.
const NAME_MAX: u32 = 255;

/// Unit for `st_blocks`.
const STAT_BLOCK_SIZE: u64 = 512;

/// Attribute TTL handed to the kernel. Zero: synthetic sidecar sizes are
/// derived from live delegate state and must never go stale in the kernel
/// cache.
const ATTR_TTL: Duration = Duration::ZERO;

/// One kernel-facing operation, with its default errno.
///
/// The default is what the kernel sees when a delegate fails without a
/// POSIX code, returns nothing, or panics. A default of `0` means the
/// operation reports success in those cases (`chmod`/`chown`/`utimens`
/// stay quiet so tools like `cp -p` keep working against delegates that
/// do not track those attributes; `fsync` has nothing to do).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Op {
    Lookup,
    Getattr,
    Statfs,
    Readdir,
    Create,
    Open,
    Release,
    Read,
    Write,
    Truncate,
    Chown,
    Chmod,
    Utimens,
    Readlink,
    Getxattr,
    Setxattr,
    Listxattr,
    Rename,
    Mkdir,
    Unlink,
    Rmdir,
    Symlink,
    Link,
    Fsync,
}

impl Op {
    /// The errno substituted when an operation fails without a POSIX code.
    pub fn default_errno(self) -> c_int {
        match self {
            Op::Lookup | Op::Getattr | Op::Statfs | Op::Readdir | Op::Open | Op::Readlink => {
                libc::ENOENT
            }
            Op::Create | Op::Rename | Op::Mkdir | Op::Unlink | Op::Rmdir => libc::EACCES,
            Op::Truncate | Op::Symlink | Op::Link => libc::ENOTSUP,
            Op::Read | Op::Write => libc::EIO,
            Op::Getxattr => ENOATTR,
            Op::Setxattr => libc::EPERM,
            Op::Listxattr => libc::ENOTSUP,
            Op::Chown | Op::Chmod | Op::Utimens | Op::Fsync | Op::Release => 0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Op::Lookup => "lookup",
            Op::Getattr => "getattr",
            Op::Statfs => "statfs",
            Op::Readdir => "readdir",
            Op::Create => "create",
            Op::Open => "open",
            Op::Release => "release",
            Op::Read => "read",
            Op::Write => "write",
            Op::Truncate => "truncate",
            Op::Chown => "chown",
            Op::Chmod => "chmod",
            Op::Utimens => "utimens",
            Op::Readlink => "readlink",
            Op::Getxattr => "getxattr",
            Op::Setxattr => "setxattr",
            Op::Listxattr => "listxattr",
            Op::Rename => "rename",
            Op::Mkdir => "mkdir",
            Op::Unlink => "unlink",
            Op::Rmdir => "rmdir",
            Op::Symlink => "symlink",
            Op::Link => "link",
            Op::Fsync => "fsync",
        }
    }
}

/// The adapter filesystem: translates fuser callbacks into facade calls.
pub struct FinderFs {
    facade: DelegateFacade,
    inodes: InodeTable,
    handles: HandleTable,
    status: Arc<Mutex<MountStatus>>,
    events: Arc<dyn EventSink>,
    mount_path: PathBuf,
    list_double_files: bool,
    handshake_attempts: u32,
    handshake_interval: Duration,
    uid: u32,
    gid: u32,
}

impl FinderFs {
    /// Builds the translator for one mount.
    pub(crate) fn new(
        delegate: Arc<dyn Delegate>,
        mount_path: PathBuf,
        config: &MountConfig,
        status: Arc<Mutex<MountStatus>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        let list_double_files = config.double_files_enabled();
        debug!(
            mount_path = %mount_path.display(),
            list_double_files,
            uid,
            gid,
            "translator ready"
        );
        Self {
            facade: DelegateFacade::new(delegate),
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            status,
            events,
            mount_path,
            list_double_files,
            handshake_attempts: config.handshake_attempts,
            handshake_interval: config.handshake_interval,
            uid,
            gid,
        }
    }

    /// Builds a translator detached from any mount.
    ///
    /// The errno-level operations below work without a kernel; this is how
    /// the test suite (and any host embedding the translator into its own
    /// fuser session) drives the adapter directly.
    pub fn with_delegate(delegate: Arc<dyn Delegate>, config: &MountConfig) -> Self {
        Self::new(
            delegate,
            PathBuf::from("/"),
            config,
            Arc::new(Mutex::new(MountStatus::NotMounted)),
            Arc::new(crate::events::NullSink),
        )
    }

    // ==================== Shared plumbing ====================

    /// Runs an inner operation inside the per-request panic boundary.
    ///
    /// A panicking delegate must not unwind into the C callback frames, so
    /// it is caught here and converted to the operation's default errno.
    fn run<T>(&self, op: Op, f: impl FnOnce() -> Result<T, c_int>) -> Result<T, c_int> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(_) => {
                error!(op = op.name(), "delegate panicked; swallowing");
                Err(op.default_errno())
            }
        }
    }

    fn errno(op: Op, e: &FsError) -> c_int {
        e.errno().unwrap_or_else(|| op.default_errno())
    }

    fn path_of(&self, inode: u64) -> Result<String, c_int> {
        self.inodes.path_of(inode).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        let parent_path = self.path_of(parent)?;
        Ok(resolver::join(&parent_path, name))
    }

    /// Fills a stat record from assembled attributes.
    ///
    /// `st_mode` is the permission bits OR'd with the type bit; an absent
    /// type is a delegate contract violation reported as `EFTYPE`. The
    /// modification date lands in both `st_mtime` and `st_atime`; the
    /// creation date lands in `st_ctime` (a long-standing quirk; POSIX
    /// calls that the inode change time) and
    /// in `st_birthtime`.
    pub fn file_attr(&self, ino: u64, attrs: &ItemAttributes) -> Result<FileAttr, c_int> {
        let kind = match attrs.kind {
            Some(FileKind::Directory) => FileType::Directory,
            Some(FileKind::Regular) => FileType::RegularFile,
            Some(FileKind::Symlink) => FileType::Symlink,
            None => return Err(EFTYPE),
        };
        let size = if kind == FileType::Directory {
            0
        } else {
            attrs.size.unwrap_or(0)
        };
        let modified = attrs.modified.unwrap_or(SystemTime::UNIX_EPOCH);
        let created = attrs.created.unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(FileAttr {
            ino,
            size,
            blocks: if size > 0 {
                size.div_ceil(STAT_BLOCK_SIZE)
            } else {
                0
            },
            atime: modified,
            mtime: modified,
            ctime: created,
            crtime: created,
            kind,
            perm: (attrs.permissions.unwrap_or(attr::DEFAULT_PERMISSIONS) & 0o7777) as u16,
            nlink: attrs.nlink.unwrap_or(1),
            uid: attrs.uid.unwrap_or(self.uid),
            gid: attrs.gid.unwrap_or(self.gid),
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        })
    }

    // ==================== Errno-level operations ====================
    //
    // The kernel-facing trait methods below are shells over these. They
    // return `Result<T, c_int>` with the per-operation default already
    // applied, which is the exact value the kernel would observe (negated).

    /// Assembled attributes at `path`, synthetic entities included.
    pub fn getattr_inner(&self, path: &str) -> Result<ItemAttributes, c_int> {
        attr::assemble(&self.facade, path).map_err(|e| Self::errno(Op::Getattr, &e))
    }

    fn getattr_reply(&self, ino: u64, path: &str) -> Result<FileAttr, c_int> {
        let attrs = self.getattr_inner(path)?;
        self.file_attr(ino, &attrs)
    }

    /// Directory names at `path` (no `.`/`..`), compat augmentation applied.
    pub fn readdir_inner(&self, path: &str) -> Result<Vec<String>, c_int> {
        self.facade
            .contents_of_directory(path, self.list_double_files)
            .map_err(|e| Self::errno(Op::Readdir, &e))
    }

    /// Opens `path` and registers the handle; returns the handle id.
    pub fn open_inner(&self, path: &str, flags: i32) -> Result<u64, c_int> {
        let handle = self
            .facade
            .open(path, flags)
            .map_err(|e| Self::errno(Op::Open, &e))?;
        Ok(self.handles.insert(handle))
    }

    /// Creates `path` through the delegate and registers the new handle.
    pub fn create_inner(&self, path: &str, mode: u32) -> Result<u64, c_int> {
        let handle = self
            .facade
            .create_file(path, mode)
            .map_err(|e| Self::errno(Op::Create, &e))?;
        Ok(self.handles.insert(handle))
    }

    /// Reads up to `size` bytes at `offset` through an open handle.
    pub fn read_inner(&self, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>, c_int> {
        let mut handle = self.handles.get_mut(fh).ok_or(libc::EBADF)?;
        let mut buf = vec![0u8; size as usize];
        let n = self
            .facade
            .read(&mut handle, offset, &mut buf)
            .map_err(|e| Self::errno(Op::Read, &e))?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Writes `data` at `offset` through an open handle.
    pub fn write_inner(&self, fh: u64, offset: u64, data: &[u8]) -> Result<u32, c_int> {
        let mut handle = self.handles.get_mut(fh).ok_or(libc::EBADF)?;
        let n = self
            .facade
            .write(&mut handle, offset, data)
            .map_err(|e| Self::errno(Op::Write, &e))?;
        Ok(n as u32)
    }

    /// Removes an open handle and returns it to the delegate.
    pub fn release_inner(&self, fh: u64) -> Result<(), c_int> {
        let handle = self.handles.remove(fh).ok_or(libc::EBADF)?;
        self.facade.release(handle);
        Ok(())
    }

    /// Truncates through the handle when one is supplied, else by path.
    pub fn truncate_inner(&self, path: &str, fh: Option<u64>, length: u64) -> Result<(), c_int> {
        let result = match fh.and_then(|fh| self.handles.get_mut(fh)) {
            Some(mut handle) => self.facade.truncate_handle(&mut handle, length),
            None => self.facade.truncate_path(path, length),
        };
        result.map_err(|e| Self::errno(Op::Truncate, &e))
    }

    /// Applies one portion of a `setattr` with that portion's default.
    ///
    /// `chmod`/`chown`/`utimens` against a delegate without a
    /// `set_attributes` capability succeed silently.
    fn apply_patch(&self, op: Op, patch: AttrPatch, path: &str) -> Result<(), c_int> {
        if !self.facade.has_set_attributes() {
            return Ok(());
        }
        match self.facade.set_attributes(&patch, path) {
            Ok(()) => Ok(()),
            Err(e) => match Self::errno(op, &e) {
                0 => Ok(()),
                errno => Err(errno),
            },
        }
    }

    /// Value of the extended attribute `name` at `path`.
    pub fn getxattr_inner(&self, path: &str, name: &str) -> Result<Vec<u8>, c_int> {
        self.facade
            .xattr_value(name, path)
            .map_err(|e| Self::errno(Op::Getxattr, &e))
    }

    /// Serialized `listxattr` names: each NUL-terminated, concatenated.
    pub fn listxattr_inner(&self, path: &str) -> Result<Vec<u8>, c_int> {
        let names = self
            .facade
            .xattr_names(path)
            .map_err(|e| Self::errno(Op::Listxattr, &e))?;
        let mut out = Vec::new();
        for name in names {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        Ok(out)
    }

    /// Sets an extended attribute through the delegate.
    pub fn setxattr_inner(&self, path: &str, name: &str, value: &[u8]) -> Result<(), c_int> {
        self.facade
            .set_xattr(name, path, value)
            .map_err(|e| Self::errno(Op::Setxattr, &e))
    }

    /// Renames `from` to `to` and re-keys the inode table.
    pub fn rename_inner(&self, from: &str, to: &str) -> Result<(), c_int> {
        self.facade
            .move_item(from, to)
            .map_err(|e| Self::errno(Op::Rename, &e))?;
        self.inodes.rename(from, to);
        Ok(())
    }

    /// Creates a directory through the delegate.
    pub fn mkdir_inner(&self, path: &str, mode: u32) -> Result<(), c_int> {
        self.facade
            .create_directory(path, mode)
            .map_err(|e| Self::errno(Op::Mkdir, &e))
    }

    /// Removes `path` (`op` selects the unlink/rmdir default errno).
    pub fn remove_inner(&self, op: Op, path: &str) -> Result<(), c_int> {
        self.facade
            .remove_item(path)
            .map_err(|e| Self::errno(op, &e))?;
        self.inodes.invalidate_path(path);
        Ok(())
    }

    /// Filesystem statistics, with the facade's 2 GiB defaults applied.
    pub fn statfs_inner(&self) -> Result<crate::attr::FsAttributes, c_int> {
        self.facade
            .fs_attributes("/")
            .map_err(|e| Self::errno(Op::Statfs, &e))
    }

    /// Target of the symlink at `path`.
    pub fn readlink_inner(&self, path: &str) -> Result<Vec<u8>, c_int> {
        self.facade
            .destination_of_symlink(path)
            .map(String::into_bytes)
            .map_err(|e| Self::errno(Op::Readlink, &e))
    }

    /// Creates a symlink at `path` pointing to `target`.
    pub fn symlink_inner(&self, path: &str, target: &str) -> Result<(), c_int> {
        self.facade
            .create_symlink(path, target)
            .map_err(|e| Self::errno(Op::Symlink, &e))
    }

    /// Creates a hard link at `path` to the item at `source`.
    pub fn link_inner(&self, path: &str, source: &str) -> Result<(), c_int> {
        self.facade
            .link_item(path, source)
            .map_err(|e| Self::errno(Op::Link, &e))
    }

    /// Answers a sized xattr query per the FUSE convention: a zero `size`
    /// probes for the required length, otherwise the data must fit.
    fn reply_sized(data: Vec<u8>, size: u32, reply: fuser::ReplyXattr) {
        if size == 0 {
            reply.size(data.len() as u32);
        } else if data.len() as u32 <= size {
            reply.data(&data);
        } else {
            reply.error(libc::ERANGE);
        }
    }

    /// The kind shown for a directory entry; falls back to a regular file
    /// when attributes are unavailable (the kernel re-checks via lookup).
    fn entry_kind(&self, path: &str) -> FileType {
        match attr::assemble(&self.facade, path) {
            Ok(attrs) => match attrs.kind {
                Some(FileKind::Directory) => FileType::Directory,
                Some(FileKind::Symlink) => FileType::Symlink,
                _ => FileType::RegularFile,
            },
            Err(_) => FileType::RegularFile,
        }
    }

    /// Number of live open handles.
    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }
}

impl Filesystem for FinderFs {
    /// Kernel connection established: start waiting for the handshake.
    ///
    /// The poller is a short-lived background task probing mount liveness
    /// on the configured cadence; on the first success the status flips to
    /// `Mounted` and `did-mount` fires. If every attempt fails the status
    /// stays `Initializing`; no automatic unmount is attempted.
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(mount_path = %self.mount_path.display(), "FUSE init; polling for handshake");
        *self.status.lock().expect("status mutex poisoned") = MountStatus::Initializing;

        let status = Arc::clone(&self.status);
        let events = Arc::clone(&self.events);
        let mount_path = self.mount_path.clone();
        let attempts = self.handshake_attempts;
        let interval = self.handshake_interval;
        thread::spawn(move || {
            if handshake::wait_until_mounted(&mount_path, attempts, interval) {
                let mut status = status.lock().expect("status mutex poisoned");
                if *status == MountStatus::Initializing {
                    *status = MountStatus::Mounted;
                    drop(status);
                    info!(mount_path = %mount_path.display(), "mounted");
                    events.post(LifecycleEvent::DidMount { mount_path });
                }
            } else {
                warn!(
                    mount_path = %mount_path.display(),
                    "handshake did not complete within the polling window"
                );
            }
        });
        Ok(())
    }

    /// Kernel teardown: hook, then status, then event.
    fn destroy(&mut self) {
        info!(mount_path = %self.mount_path.display(), "FUSE destroy");
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            self.facade.delegate().will_unmount();
        }));
        *self.status.lock().expect("status mutex poisoned") = MountStatus::Unmounting;
        self.events.post(LifecycleEvent::DidUnmount {
            mount_path: self.mount_path.clone(),
        });
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = self.run(Op::Lookup, || {
            let path = self.child_path(parent, name)?;
            trace!(parent, path, "lookup");
            let attrs = self.getattr_inner(&path)?;
            let ino = self.inodes.lookup(&path);
            self.file_attr(ino, &attrs)
        });
        match result {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.run(Op::Getattr, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, "getattr");
            self.getattr_reply(ino, &path)
        });
        match result {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let result = self.run(Op::Readlink, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, "readlink");
            self.readlink_inner(&path)
        });
        match result {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self.run(Op::Open, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, flags, "open");
            self.open_inner(&path, flags)
        });
        match result {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self.run(Op::Read, || {
            trace!(fh, offset, size, "read");
            self.read_inner(fh, offset.max(0) as u64, size)
        });
        match result {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self.run(Op::Write, || {
            trace!(fh, offset, len = data.len(), "write");
            self.write_inner(fh, offset.max(0) as u64, data)
        });
        match result {
            Ok(written) => reply.written(written),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self.run(Op::Release, || {
            trace!(fh, "release");
            self.release_inner(fh)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(0) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let result = self.run(Op::Readdir, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, offset, "readdir");
            let names = self.readdir_inner(&path)?;

            let parent_ino = if path == "/" {
                ROOT_INODE
            } else {
                let idx = path.rfind('/').unwrap_or(0);
                let parent_path = if idx == 0 { "/" } else { &path[..idx] };
                self.inodes.peek(parent_path)
            };

            let mut entries: Vec<(u64, FileType, String)> = vec![
                (ino, FileType::Directory, ".".to_string()),
                (parent_ino, FileType::Directory, "..".to_string()),
            ];
            for name in names {
                let full = resolver::join(&path, &name);
                let kind = self.entry_kind(&full);
                entries.push((self.inodes.peek(&full), kind, name));
            }
            Ok(entries)
        });
        let entries = match result {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break; // buffer full
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let result = self.run(Op::Statfs, || self.statfs_inner());
        match result {
            Ok(stats) => {
                let frsize = u64::from(BLOCK_SIZE);
                reply.statfs(
                    stats.size / frsize,
                    stats.free_size / frsize,
                    stats.free_size / frsize,
                    stats.nodes,
                    stats.free_nodes,
                    BLOCK_SIZE,
                    NAME_MAX,
                    BLOCK_SIZE,
                );
            }
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = self.run(Op::Getattr, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, ?mode, ?uid, ?gid, ?size, "setattr");

            if let Some(length) = size {
                self.run(Op::Truncate, || self.truncate_inner(&path, fh, length))?;
            }
            if let Some(mode) = mode {
                let patch = AttrPatch {
                    permissions: Some(mode & 0o7777),
                    ..AttrPatch::default()
                };
                self.run(Op::Chmod, || self.apply_patch(Op::Chmod, patch, &path))?;
            }
            if uid.is_some() || gid.is_some() {
                let patch = AttrPatch {
                    uid,
                    gid,
                    ..AttrPatch::default()
                };
                self.run(Op::Chown, || self.apply_patch(Op::Chown, patch, &path))?;
            }
            // The access date mirrors the modification date throughout, so
            // only mtime and the creation date reach the delegate.
            let modified = mtime.map(|t| match t {
                TimeOrNow::SpecificTime(t) => t,
                TimeOrNow::Now => SystemTime::now(),
            });
            if modified.is_some() || crtime.is_some() {
                let patch = AttrPatch {
                    modified,
                    created: crtime,
                    ..AttrPatch::default()
                };
                self.run(Op::Utimens, || self.apply_patch(Op::Utimens, patch, &path))?;
            }

            self.getattr_reply(ino, &path)
        });
        match result {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let result = self.run(Op::Create, || {
            let path = self.child_path(parent, name)?;
            trace!(parent, path, mode, "create");
            let fh = self.create_inner(&path, mode)?;
            let attrs = self.getattr_inner(&path)?;
            let ino = self.inodes.lookup(&path);
            let attr = self.file_attr(ino, &attrs)?;
            Ok((attr, fh))
        });
        match result {
            Ok((attr, fh)) => reply.created(&ATTR_TTL, &attr, 0, fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.run(Op::Mkdir, || {
            let path = self.child_path(parent, name)?;
            trace!(parent, path, mode, "mkdir");
            self.mkdir_inner(&path, mode)?;
            let attrs = self.getattr_inner(&path)?;
            let ino = self.inodes.lookup(&path);
            self.file_attr(ino, &attrs)
        });
        match result {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.run(Op::Unlink, || {
            let path = self.child_path(parent, name)?;
            trace!(parent, path, "unlink");
            self.remove_inner(Op::Unlink, &path)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.run(Op::Rmdir, || {
            let path = self.child_path(parent, name)?;
            trace!(parent, path, "rmdir");
            self.remove_inner(Op::Rmdir, &path)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let result = self.run(Op::Rename, || {
            let from = self.child_path(parent, name)?;
            let to = self.child_path(newparent, newname)?;
            trace!(from, to, "rename");
            self.rename_inner(&from, &to)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &std::path::Path,
        reply: ReplyEntry,
    ) {
        let result = self.run(Op::Symlink, || {
            let path = self.child_path(parent, link_name)?;
            let target = target.to_str().ok_or(libc::EINVAL)?;
            trace!(path, target, "symlink");
            self.symlink_inner(&path, target)?;
            let attrs = self.getattr_inner(&path)?;
            let ino = self.inodes.lookup(&path);
            self.file_attr(ino, &attrs)
        });
        match result {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let result = self.run(Op::Link, || {
            let source = self.path_of(ino)?;
            let path = self.child_path(newparent, newname)?;
            trace!(path, source, "link");
            self.link_inner(&path, &source)?;
            let attrs = self.getattr_inner(&path)?;
            let ino = self.inodes.lookup(&path);
            self.file_attr(ino, &attrs)
        });
        match result {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        // Nothing to flush: the adapter holds no dirty state of its own.
        trace!(fh, datasync, "fsync");
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: fuser::ReplyXattr,
    ) {
        let result = self.run(Op::Getxattr, || {
            let path = self.path_of(ino)?;
            let name = name.to_str().ok_or(libc::EINVAL)?;
            trace!(ino, path, name, "getxattr");
            self.getxattr_inner(&path, name)
        });
        match result {
            Ok(value) => Self::reply_sized(value, size, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self.run(Op::Setxattr, || {
            let path = self.path_of(ino)?;
            let name = name.to_str().ok_or(libc::EINVAL)?;
            trace!(ino, path, name, len = value.len(), "setxattr");
            self.setxattr_inner(&path, name, value)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: fuser::ReplyXattr) {
        let result = self.run(Op::Listxattr, || {
            let path = self.path_of(ino)?;
            trace!(ino, path, "listxattr");
            self.listxattr_inner(&path)
        });
        match result {
            Ok(serialized) => Self::reply_sized(serialized, size, reply),
            Err(errno) => reply.error(errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_errno_table() {
        assert_eq!(Op::Statfs.default_errno(), libc::ENOENT);
        assert_eq!(Op::Getattr.default_errno(), libc::ENOENT);
        assert_eq!(Op::Readdir.default_errno(), libc::ENOENT);
        assert_eq!(Op::Create.default_errno(), libc::EACCES);
        assert_eq!(Op::Open.default_errno(), libc::ENOENT);
        assert_eq!(Op::Truncate.default_errno(), libc::ENOTSUP);
        assert_eq!(Op::Chown.default_errno(), 0);
        assert_eq!(Op::Chmod.default_errno(), 0);
        assert_eq!(Op::Utimens.default_errno(), 0);
        assert_eq!(Op::Write.default_errno(), libc::EIO);
        assert_eq!(Op::Read.default_errno(), libc::EIO);
        assert_eq!(Op::Readlink.default_errno(), libc::ENOENT);
        assert_eq!(Op::Getxattr.default_errno(), ENOATTR);
        assert_eq!(Op::Setxattr.default_errno(), libc::EPERM);
        assert_eq!(Op::Listxattr.default_errno(), libc::ENOTSUP);
        assert_eq!(Op::Rename.default_errno(), libc::EACCES);
        assert_eq!(Op::Mkdir.default_errno(), libc::EACCES);
        assert_eq!(Op::Unlink.default_errno(), libc::EACCES);
        assert_eq!(Op::Rmdir.default_errno(), libc::EACCES);
        assert_eq!(Op::Symlink.default_errno(), libc::ENOTSUP);
        assert_eq!(Op::Link.default_errno(), libc::ENOTSUP);
        assert_eq!(Op::Fsync.default_errno(), 0);
    }

    #[test]
    fn statvfs_constants() {
        // Every statfs reply carries these regardless of delegate input.
        assert_eq!(NAME_MAX, 255);
        assert_eq!(BLOCK_SIZE, 4096);
        assert_eq!(STAT_BLOCK_SIZE, 512);
    }

    #[test]
    fn panic_is_swallowed_into_the_default() {
        struct Panicking;
        impl Delegate for Panicking {}
        let fs = FinderFs::with_delegate(Arc::new(Panicking), &MountConfig::default());
        let result: Result<(), c_int> = fs.run(Op::Read, || panic!("delegate bug"));
        assert_eq!(result.unwrap_err(), libc::EIO);
        let result: Result<(), c_int> = fs.run(Op::Rename, || panic!("delegate bug"));
        assert_eq!(result.unwrap_err(), libc::EACCES);
    }

    #[test]
    fn destroy_runs_hook_then_status_then_event() {
        use std::sync::atomic::{AtomicBool, Ordering};

        static HOOKED: AtomicBool = AtomicBool::new(false);

        struct Hooked;
        impl Delegate for Hooked {
            fn will_unmount(&self) {
                HOOKED.store(true, Ordering::SeqCst);
            }
        }

        let status = Arc::new(Mutex::new(MountStatus::Mounted));
        let (sink, events) = crate::events::ChannelSink::new();
        let mut fs = FinderFs::new(
            Arc::new(Hooked),
            PathBuf::from("/tmp/finderfs-destroy-test"),
            &MountConfig::default(),
            Arc::clone(&status),
            sink,
        );

        Filesystem::destroy(&mut fs);

        assert!(HOOKED.load(Ordering::SeqCst));
        assert_eq!(*status.lock().unwrap(), MountStatus::Unmounting);
        match events.try_recv().unwrap() {
            LifecycleEvent::DidUnmount { mount_path } => {
                assert_eq!(mount_path, PathBuf::from("/tmp/finderfs-destroy-test"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn destroy_survives_a_panicking_hook() {
        struct Explosive;
        impl Delegate for Explosive {
            fn will_unmount(&self) {
                panic!("hook bug");
            }
        }

        let status = Arc::new(Mutex::new(MountStatus::Mounted));
        let mut fs = FinderFs::new(
            Arc::new(Explosive),
            PathBuf::from("/tmp/finderfs-destroy-panic"),
            &MountConfig::default(),
            Arc::clone(&status),
            Arc::new(crate::events::NullSink),
        );

        Filesystem::destroy(&mut fs);
        assert_eq!(*status.lock().unwrap(), MountStatus::Unmounting);
    }
}
