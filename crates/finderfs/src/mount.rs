//! Mount lifecycle control.
//!
//! One [`MountController`] owns one mount point. It runs the blocking FUSE
//! event loop, tracks the status machine, and performs out-of-band unmounts
//! through the platform utilities. Status transitions arrive from three
//! directions (the mount thread, the FUSE `init`/`destroy` callbacks, and
//! the handshake poller), so the status lives behind a mutex shared with
//! the translator.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;

use fuser::MountOption;
use tracing::{debug, info, warn};

use crate::config::MountConfig;
use crate::delegate::Delegate;
use crate::error::MountError;
use crate::events::{EventSink, LifecycleEvent, NullSink};
use crate::filesystem::FinderFs;

/// Lifecycle state of one filesystem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// No mount attempt in progress.
    NotMounted,
    /// The event loop is starting; the kernel has not called `init` yet.
    Mounting,
    /// `init` arrived; waiting for the kernel handshake.
    Initializing,
    /// The handshake completed; the volume is usable.
    Mounted,
    /// The kernel called `destroy`; the event loop is winding down.
    Unmounting,
    /// The event loop exited while still mounting.
    Failure,
}

/// Drives the FUSE event loop for one mount point.
pub struct MountController {
    delegate: Arc<dyn Delegate>,
    mount_path: PathBuf,
    config: MountConfig,
    events: Arc<dyn EventSink>,
    status: Arc<Mutex<MountStatus>>,
}

impl MountController {
    /// Creates a controller that discards lifecycle events.
    pub fn new(
        delegate: Arc<dyn Delegate>,
        mount_path: impl Into<PathBuf>,
        config: MountConfig,
    ) -> Self {
        Self::with_events(delegate, mount_path, config, Arc::new(NullSink))
    }

    /// Creates a controller that posts lifecycle events to `events`.
    pub fn with_events(
        delegate: Arc<dyn Delegate>,
        mount_path: impl Into<PathBuf>,
        config: MountConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            delegate,
            mount_path: mount_path.into(),
            config,
            events,
            status: Arc::new(Mutex::new(MountStatus::NotMounted)),
        }
    }

    /// The mount point this controller manages.
    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// The current lifecycle status.
    pub fn status(&self) -> MountStatus {
        *self.status.lock().expect("status mutex poisoned")
    }

    /// The libfuse-style argv equivalent of this configuration:
    /// `[exe, -s?, -f?, -o<opt>…, mountpath]`.
    ///
    /// `-s` appears when the delegate is not thread-safe; empty option
    /// strings are skipped. Logged at mount time so the effective
    /// configuration is visible in traces.
    pub fn fuse_argv(&self) -> Vec<String> {
        let exe = std::env::current_exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "finderfs".to_string());
        let mut argv = vec![exe];
        if !self.delegate.is_thread_safe() {
            argv.push("-s".to_string());
        }
        if self.config.foreground {
            argv.push("-f".to_string());
        }
        if let Some(name) = &self.config.volume_name {
            argv.push(format!("-ovolname={name}"));
        }
        for opt in &self.config.options {
            if !opt.is_empty() {
                argv.push(format!("-o{opt}"));
            }
        }
        argv.push(self.mount_path.to_string_lossy().into_owned());
        argv
    }

    /// The fuser mount options equivalent to [`fuse_argv`](Self::fuse_argv).
    fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName("finderfs".to_string())];
        if let Some(name) = &self.config.volume_name {
            options.push(MountOption::CUSTOM(format!("volname={name}")));
        }
        for opt in &self.config.options {
            if !opt.is_empty() {
                options.push(MountOption::CUSTOM(opt.clone()));
            }
        }
        options
    }

    /// Runs the blocking event loop until unmount.
    ///
    /// The delegate's `will_mount` hook runs first, then the status flips to
    /// `Mounting` and the session runs on the calling thread. Callbacks are
    /// dispatched from the session thread only, which is what honors the
    /// `-s` single-threaded contract for delegates that are not thread-safe.
    ///
    /// On return the status machine resolves: an event loop that exits while
    /// still `Mounting` never completed the handshake, so the status becomes
    /// `Failure` and a `mount-failed` event fires; any other exit is a clean
    /// teardown back to `NotMounted`.
    pub fn mount(&self) -> Result<(), MountError> {
        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            if *status != MountStatus::NotMounted && *status != MountStatus::Failure {
                return Err(MountError::AlreadyMounted);
            }
            *status = MountStatus::Mounting;
        }
        if !self.mount_path.exists() {
            *self.status.lock().expect("status mutex poisoned") = MountStatus::NotMounted;
            return Err(MountError::MountPointNotFound(self.mount_path.clone()));
        }

        self.delegate.will_mount();
        info!(argv = ?self.fuse_argv(), "starting FUSE event loop");

        let fs = FinderFs::new(
            Arc::clone(&self.delegate),
            self.mount_path.clone(),
            &self.config,
            Arc::clone(&self.status),
            Arc::clone(&self.events),
        );

        let result = fuser::mount2(fs, &self.mount_path, &self.mount_options());

        let mut status = self.status.lock().expect("status mutex poisoned");
        if *status == MountStatus::Mounting {
            // The loop exited before init ever arrived: a mount failure.
            *status = MountStatus::Failure;
            drop(status);
            let error = match &result {
                Ok(()) => "event loop exited before the mount initialized".to_string(),
                Err(e) => e.to_string(),
            };
            warn!(mount_path = %self.mount_path.display(), error, "mount failed");
            self.events.post(LifecycleEvent::MountFailed {
                mount_path: self.mount_path.clone(),
                error: error.clone(),
            });
            return match result {
                Ok(()) => Err(MountError::SessionFailed(std::io::Error::other(error))),
                Err(e) => Err(MountError::SessionFailed(e)),
            };
        }
        *status = MountStatus::NotMounted;
        drop(status);

        info!(mount_path = %self.mount_path.display(), "FUSE event loop exited");
        result.map_err(MountError::SessionFailed)
    }

    /// Runs [`mount`](Self::mount) on a background thread.
    pub fn spawn_mount(self: Arc<Self>) -> thread::JoinHandle<Result<(), MountError>> {
        thread::spawn(move || self.mount())
    }

    /// Unmounts by invoking the platform `umount` utility.
    ///
    /// The kernel observes the unmount and delivers `destroy` to the event
    /// loop, which is where the status machine advances; this method only
    /// kicks the process off.
    pub fn unmount(&self) -> Result<(), MountError> {
        if self.status() != MountStatus::Mounted {
            return Err(MountError::NotMounted);
        }
        debug!(mount_path = %self.mount_path.display(), "invoking umount");
        let output = Command::new("umount")
            .arg(&self.mount_path)
            .output()
            .map_err(|e| MountError::UnmountFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(MountError::UnmountFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    /// Force-unmounts a busy volume.
    ///
    /// Tries `diskutil unmount force` first on macOS, which is more reliable
    /// against open files, then falls back to `umount -f`.
    pub fn force_unmount(&self) -> Result<(), MountError> {
        #[cfg(target_os = "macos")]
        {
            let result = Command::new("diskutil")
                .args(["unmount", "force"])
                .arg(&self.mount_path)
                .output();
            if matches!(result, Ok(ref output) if output.status.success()) {
                debug!("force unmount via diskutil succeeded");
                return Ok(());
            }
            debug!("diskutil unmount failed, trying umount -f");
        }
        let output = Command::new("umount")
            .arg("-f")
            .arg(&self.mount_path)
            .output()
            .map_err(|e| MountError::UnmountFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(MountError::UnmountFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::Capabilities;

    struct Plain;
    impl Delegate for Plain {}

    struct ThreadSafe;
    impl Delegate for ThreadSafe {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
        fn is_thread_safe(&self) -> bool {
            true
        }
    }

    #[test]
    fn starts_not_mounted() {
        let controller = MountController::new(Arc::new(Plain), "/tmp/mnt", MountConfig::default());
        assert_eq!(controller.status(), MountStatus::NotMounted);
    }

    #[test]
    fn argv_shape_for_non_thread_safe_delegate() {
        let config = MountConfig::default()
            .foreground(true)
            .option("nolocalcaches")
            .option("") // skipped
            .volume_name("Vol");
        let controller = MountController::new(Arc::new(Plain), "/tmp/mnt", config);
        let argv = controller.fuse_argv();
        assert_eq!(argv[1], "-s");
        assert_eq!(argv[2], "-f");
        assert_eq!(argv[3], "-ovolname=Vol");
        assert_eq!(argv[4], "-onolocalcaches");
        assert_eq!(argv.last().map(String::as_str), Some("/tmp/mnt"));
        assert_eq!(argv.len(), 6);
    }

    #[test]
    fn thread_safe_delegate_drops_single_threaded_flag() {
        let controller =
            MountController::new(Arc::new(ThreadSafe), "/tmp/mnt", MountConfig::default());
        let argv = controller.fuse_argv();
        assert!(!argv.contains(&"-s".to_string()));
    }

    #[test]
    fn mount_rejects_missing_mount_point() {
        let controller = MountController::new(
            Arc::new(Plain),
            "/definitely/not/here",
            MountConfig::default(),
        );
        match controller.mount() {
            Err(MountError::MountPointNotFound(p)) => {
                assert_eq!(p, PathBuf::from("/definitely/not/here"));
            }
            other => panic!("expected MountPointNotFound, got {other:?}"),
        }
        assert_eq!(controller.status(), MountStatus::NotMounted);
    }

    #[test]
    fn unmount_requires_mounted_status() {
        let controller = MountController::new(Arc::new(Plain), "/tmp/mnt", MountConfig::default());
        assert!(matches!(controller.unmount(), Err(MountError::NotMounted)));
    }
}
