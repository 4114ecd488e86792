//! Mount configuration.
//!
//! Options are opaque strings handed to the FUSE layer as `-o<opt>`; the
//! few the adapter understands natively (volume name, foreground) have
//! dedicated fields. The Finder-compat listing mode defaults to a host
//! probe but can be forced either way, which is also how the tests run
//! both modes deterministically.

use std::time::Duration;

/// Configuration for one mounted filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Raw mount options, passed through as `-o<opt>`. Empty strings are
    /// skipped.
    pub options: Vec<String>,
    /// Run the event loop in the foreground (`-f`).
    pub foreground: bool,
    /// Volume name shown in the Finder (`-ovolname=`).
    pub volume_name: Option<String>,
    /// Force the "list double files" compat mode instead of probing the
    /// host FUSE version.
    pub list_double_files: Option<bool>,
    /// Handshake poll attempts before giving up.
    pub handshake_attempts: u32,
    /// Delay between handshake polls.
    pub handshake_interval: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            foreground: false,
            volume_name: None,
            list_double_files: None,
            handshake_attempts: 50,
            handshake_interval: Duration::from_millis(100),
        }
    }
}

impl MountConfig {
    /// Adds one raw mount option.
    #[must_use]
    pub fn option(mut self, opt: impl Into<String>) -> Self {
        self.options.push(opt.into());
        self
    }

    /// Sets the Finder volume name.
    #[must_use]
    pub fn volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }

    /// Runs the event loop in the foreground.
    #[must_use]
    pub fn foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }

    /// Forces the double-file listing mode on or off.
    #[must_use]
    pub fn list_double_files(mut self, enabled: bool) -> Self {
        self.list_double_files = Some(enabled);
        self
    }

    /// Whether synthetic `._` names appear in directory listings.
    ///
    /// Unset, this probes the host FUSE implementation: versions older than
    /// major 9 predate kernel xattr bridging and need the double files
    /// listed; newer hosts serve the same data through `getxattr`.
    #[must_use]
    pub fn double_files_enabled(&self) -> bool {
        self.list_double_files
            .unwrap_or_else(|| matches!(host_fuse_major_version(), Some(major) if major < 9))
    }
}

/// Major version of the host macFUSE installation, when detectable.
///
/// Queries the kernel extension's version sysctl. Returns `None` off macOS
/// or when no FUSE implementation is loaded.
#[cfg(target_os = "macos")]
pub fn host_fuse_major_version() -> Option<u32> {
    use std::ffi::CString;

    // Current macFUSE first, then the legacy osxfuse name.
    for name in [
        "vfs.generic.macfuse.version.number",
        "vfs.generic.osxfuse.version.number",
    ] {
        let cname = CString::new(name).ok()?;
        let mut buf = [0u8; 32];
        let mut len = buf.len();
        let rc = unsafe {
            libc::sysctlbyname(
                cname.as_ptr(),
                buf.as_mut_ptr().cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc == 0 {
            let text = std::str::from_utf8(&buf[..len]).ok()?;
            let major = text.trim_end_matches('\0').split('.').next()?;
            return major.trim().parse().ok();
        }
    }
    None
}

/// Major version of the host macFUSE installation, when detectable.
#[cfg(not(target_os = "macos"))]
pub fn host_fuse_major_version() -> Option<u32> {
    None
}
