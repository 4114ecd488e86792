//! Inode ↔ path mapping.
//!
//! The delegate surface is path-addressed while the kernel speaks inodes,
//! so the translator keeps a bidirectional table: inodes are allocated on
//! first lookup and evicted when the kernel's lookup count drops to zero.
//! Entries handed out through `readdir` do not bump the count; only
//! `lookup`, `create` and `mkdir` replies do.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
struct InodeEntry {
    path: String,
    nlookup: AtomicU64,
}

/// Concurrent path/inode table with kernel lookup-count tracking.
pub(crate) struct InodeTable {
    by_inode: DashMap<u64, InodeEntry>,
    by_path: DashMap<String, u64>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root pre-allocated at inode 1.
    pub(crate) fn new() -> Self {
        let table = Self {
            by_inode: DashMap::new(),
            by_path: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.by_inode.insert(
            ROOT_INODE,
            InodeEntry {
                path: "/".to_string(),
                nlookup: AtomicU64::new(1),
            },
        );
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// The path behind an inode, if the inode is live.
    pub(crate) fn path_of(&self, inode: u64) -> Option<String> {
        self.by_inode.get(&inode).map(|e| e.path.clone())
    }

    /// The inode for a path, allocating one and bumping the lookup count.
    pub(crate) fn lookup(&self, path: &str) -> u64 {
        let inode = self.get_or_insert(path);
        if let Some(entry) = self.by_inode.get(&inode) {
            entry.nlookup.fetch_add(1, Ordering::Relaxed);
        }
        inode
    }

    /// The inode for a path without touching the lookup count (readdir).
    pub(crate) fn peek(&self, path: &str) -> u64 {
        self.get_or_insert(path)
    }

    fn get_or_insert(&self, path: &str) -> u64 {
        if let Some(inode) = self.by_path.get(path) {
            return *inode;
        }
        let inode = self.next_inode.fetch_add(1, Ordering::Relaxed);
        self.by_inode.insert(
            inode,
            InodeEntry {
                path: path.to_string(),
                nlookup: AtomicU64::new(0),
            },
        );
        self.by_path.insert(path.to_string(), inode);
        inode
    }

    /// Drops `count` kernel references; evicts the entry when none remain.
    /// The root is never evicted.
    pub(crate) fn forget(&self, inode: u64, count: u64) {
        if inode == ROOT_INODE {
            return;
        }
        let evict = match self.by_inode.get(&inode) {
            Some(entry) => entry.nlookup.fetch_sub(count, Ordering::AcqRel) <= count,
            None => false,
        };
        if evict {
            if let Some((_, entry)) = self.by_inode.remove(&inode) {
                self.by_path.remove(&entry.path);
            }
        }
    }

    /// Re-keys an inode after a successful rename.
    pub(crate) fn rename(&self, old_path: &str, new_path: &str) {
        if let Some((_, inode)) = self.by_path.remove(old_path) {
            self.by_path.insert(new_path.to_string(), inode);
            if let Some(mut entry) = self.by_inode.get_mut(&inode) {
                entry.path = new_path.to_string();
            }
        }
    }

    /// Drops the path mapping after an unlink. The inode entry survives
    /// until the kernel forgets it.
    pub(crate) fn invalidate_path(&self, path: &str) {
        self.by_path.remove(path);
    }

    /// Number of live inodes.
    pub(crate) fn len(&self) -> usize {
        self.by_inode.len()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lookup_is_stable_per_path() {
        let table = InodeTable::new();
        let a = table.lookup("/a");
        let b = table.lookup("/b");
        assert_ne!(a, b);
        assert_eq!(table.lookup("/a"), a);
        assert_eq!(table.peek("/a"), a);
    }

    #[test]
    fn forget_evicts_at_zero() {
        let table = InodeTable::new();
        let a = table.lookup("/a");
        let _ = table.lookup("/a"); // nlookup = 2
        table.forget(a, 1);
        assert_eq!(table.path_of(a).as_deref(), Some("/a"));
        table.forget(a, 1);
        assert!(table.path_of(a).is_none());
        // A later lookup allocates a fresh inode.
        assert_ne!(table.lookup("/a"), a);
    }

    #[test]
    fn root_survives_forget() {
        let table = InodeTable::new();
        table.forget(ROOT_INODE, 100);
        assert_eq!(table.path_of(ROOT_INODE).as_deref(), Some("/"));
    }

    #[test]
    fn readdir_entries_do_not_pin() {
        let table = InodeTable::new();
        let a = table.peek("/a");
        // One forget with any count evicts an unpinned entry.
        table.forget(a, 1);
        assert!(table.path_of(a).is_none());
    }

    #[test]
    fn rename_rekeys_the_path() {
        let table = InodeTable::new();
        let a = table.lookup("/old");
        table.rename("/old", "/new");
        assert_eq!(table.path_of(a).as_deref(), Some("/new"));
        assert_eq!(table.lookup("/new"), a);
        assert_ne!(table.lookup("/old"), a);
    }

    #[test]
    fn invalidate_keeps_inode_until_forget() {
        let table = InodeTable::new();
        let a = table.lookup("/doomed");
        table.invalidate_path("/doomed");
        // The kernel may still address the inode.
        assert_eq!(table.path_of(a).as_deref(), Some("/doomed"));
        table.forget(a, 1);
        assert!(table.path_of(a).is_none());
    }
}
