//! Mount handshake detection.
//!
//! A macFUSE mount is not usable the instant the event loop starts; the
//! kernel signals completion through an ioctl on the channel device
//! (`FUSEDEVIOCGETHANDSHAKECOMPLETE`). When the device descriptor is not
//! reachable (the session layer owns it), the poller falls back to
//! comparing device ids: a live mount point sits on a different `st_dev`
//! than its parent directory.

use std::path::Path;

/// `_IOR('F', 2, u32)`: query handshake completion on the FUSE channel.
///
/// Encoding: direction OUT (`0x4000_0000`), payload size 4, group `'F'`,
/// command 2.
pub const FUSEDEVIOCGETHANDSHAKECOMPLETE: u64 =
    0x4000_0000 | ((std::mem::size_of::<u32>() as u64) << 16) | ((b'F' as u64) << 8) | 2;

/// Asks the FUSE channel device whether the kernel handshake completed.
#[cfg(target_os = "macos")]
pub fn device_handshake_complete(fd: std::os::fd::RawFd) -> std::io::Result<bool> {
    let mut complete: u32 = 0;
    // SAFETY: the ioctl writes a single u32 into `complete`, which outlives
    // the call; the request code matches that payload size.
    let rc = unsafe {
        libc::ioctl(
            fd,
            FUSEDEVIOCGETHANDSHAKECOMPLETE as libc::c_ulong,
            &mut complete as *mut u32,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(complete != 0)
}

/// Whether `mount_path` is an active mount point.
///
/// Stat-based: a mounted path reports a different device id than its
/// parent. This avoids parsing mount tables, which can block on ghost
/// mounts.
pub fn is_mount_active(mount_path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let parent = mount_path.parent().unwrap_or(Path::new("/"));
        match (std::fs::metadata(mount_path), std::fs::metadata(parent)) {
            (Ok(path_meta), Ok(parent_meta)) => path_meta.dev() != parent_meta.dev(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        mount_path.is_dir()
    }
}

/// Polls until the mount at `mount_path` becomes active.
///
/// Returns `true` on the first successful probe, `false` once `attempts`
/// polls spaced `interval` apart have all failed.
pub fn wait_until_mounted(
    mount_path: &Path,
    attempts: u32,
    interval: std::time::Duration,
) -> bool {
    for _ in 0..attempts {
        if is_mount_active(mount_path) {
            return true;
        }
        std::thread::sleep(interval);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_code_matches_ior_encoding() {
        // _IOR('F', 2, uint32_t) as computed by the macOS ioccom.h macros.
        assert_eq!(FUSEDEVIOCGETHANDSHAKECOMPLETE, 0x4004_4602);
    }

    #[test]
    fn plain_directory_is_not_a_mount() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_mount_active(dir.path()));
    }

    #[test]
    fn missing_path_is_not_a_mount() {
        assert!(!is_mount_active(Path::new("/definitely/not/a/mount/point")));
    }

    #[test]
    fn wait_gives_up_after_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let start = std::time::Instant::now();
        let mounted =
            wait_until_mounted(dir.path(), 3, std::time::Duration::from_millis(1));
        assert!(!mounted);
        assert!(start.elapsed() >= std::time::Duration::from_millis(3));
    }
}
