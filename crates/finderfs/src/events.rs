//! Mount lifecycle events.
//!
//! The adapter reports lifecycle transitions to an [`EventSink`] supplied at
//! construction instead of posting to any process-global notification
//! mechanism, so hosts decide where events go: a channel, a logger, a UI.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

/// A lifecycle transition of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The mount attempt failed; carries the event-loop error text.
    MountFailed {
        /// Where the filesystem was being mounted.
        mount_path: PathBuf,
        /// The failure, stringified from the session error.
        error: String,
    },
    /// The kernel handshake completed; the volume is usable.
    DidMount {
        /// Where the filesystem is mounted.
        mount_path: PathBuf,
    },
    /// The kernel tore the mount down.
    DidUnmount {
        /// Where the filesystem was mounted.
        mount_path: PathBuf,
    },
}

/// Receives lifecycle events. Implementations must be cheap and non-blocking;
/// events are posted from the mount thread and from FUSE callbacks.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn post(&self, event: LifecycleEvent);
}

/// Discards every event. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn post(&self, _event: LifecycleEvent) {}
}

/// Forwards events into a crossbeam channel.
///
/// The receiving half is handed back at construction; hosts typically drain
/// it from their own event loop. Send failures (receiver dropped) are
/// ignored; a host that stopped listening has opted out.
pub struct ChannelSink {
    sender: crossbeam_channel::Sender<LifecycleEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that observes it.
    #[must_use]
    pub fn new() -> (Arc<Self>, crossbeam_channel::Receiver<LifecycleEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventSink for ChannelSink {
    fn post(&self, event: LifecycleEvent) {
        info!(?event, "lifecycle event");
        let _ = self.sender.send(event);
    }
}
