//! Open-file handles and the table that owns them between open and release.
//!
//! The kernel threads an opaque `u64` through every operation on an open
//! file. The adapter never hands raw pointers across that boundary: it keeps
//! the owned payload in a concurrent table keyed by a generated id, inserts
//! at `open`/`create`, borrows for `read`/`write`/`truncate`, and removes
//! exactly once at `release`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::delegate::FileHandle;

/// The payload behind one kernel file handle.
pub(crate) enum OpenHandle {
    /// A complete in-memory byte buffer: synthetic sidecars, icon slots and
    /// `contents_at_path` snapshots.
    Buffer { path: String, bytes: Vec<u8> },
    /// A live delegate handle, returned to the delegate at release.
    Delegate {
        path: String,
        handle: Box<dyn FileHandle>,
    },
}

impl OpenHandle {
    /// The path this handle was opened at.
    pub(crate) fn path(&self) -> &str {
        match self {
            OpenHandle::Buffer { path, .. } | OpenHandle::Delegate { path, .. } => path,
        }
    }
}

impl std::fmt::Debug for OpenHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenHandle::Buffer { path, bytes } => f
                .debug_struct("Buffer")
                .field("path", path)
                .field("len", &bytes.len())
                .finish(),
            OpenHandle::Delegate { path, .. } => {
                f.debug_struct("Delegate").field("path", path).finish()
            }
        }
    }
}

/// Concurrent handle table with generated ids.
///
/// Ids start at 1; 0 is reserved as the null handle. The id counter wraps
/// safely and never hands out an id that is still occupied.
pub(crate) struct HandleTable {
    handles: DashMap<u64, OpenHandle>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a handle and returns its generated id.
    pub(crate) fn insert(&self, handle: OpenHandle) -> u64 {
        let mut handle = Some(handle);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            match self.handles.entry(id) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(handle.take().expect("handle consumed twice"));
                    return id;
                }
            }
        }
    }

    /// Borrows a handle mutably; `None` when the id is unknown.
    pub(crate) fn get_mut(&self, id: u64) -> Option<RefMut<'_, u64, OpenHandle>> {
        self.handles.get_mut(&id)
    }

    /// Removes a handle, transferring ownership back to the caller.
    pub(crate) fn remove(&self, id: u64) -> Option<OpenHandle> {
        self.handles.remove(&id).map(|(_, h)| h)
    }

    /// Number of live handles.
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn buffer(path: &str) -> OpenHandle {
        OpenHandle::Buffer {
            path: path.to_string(),
            bytes: Vec::new(),
        }
    }

    #[test]
    fn ids_start_at_one_and_are_unique() {
        let table = HandleTable::new();
        let a = table.insert(buffer("/a"));
        let b = table.insert(buffer("/b"));
        assert_eq!(a, 1);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_is_exactly_once() {
        let table = HandleTable::new();
        let id = table.insert(buffer("/a"));
        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn zero_is_never_issued() {
        let table = HandleTable::new();
        table.next_id.store(u64::MAX, Ordering::Relaxed);
        let id = table.insert(buffer("/wrap"));
        assert_eq!(id, u64::MAX);
        let id = table.insert(buffer("/after"));
        assert_ne!(id, 0);
    }

    #[test]
    fn concurrent_inserts_stay_unique() {
        let table = Arc::new(HandleTable::new());
        let mut joins = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            joins.push(thread::spawn(move || {
                (0..50).map(|i| table.insert(buffer(&format!("/{i}")))).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = joins
            .into_iter()
            .flat_map(|j| j.join().unwrap())
            .collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);
        assert_eq!(table.len(), n);
    }

    #[test]
    fn handle_remembers_its_path() {
        let table = HandleTable::new();
        let id = table.insert(buffer("/hello"));
        assert_eq!(table.get_mut(id).unwrap().path(), "/hello");
    }
}
