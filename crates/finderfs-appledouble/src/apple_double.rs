//! AppleDouble sidecar container.
//!
//! An AppleDouble file is the "`._name`" companion written next to "`name`"
//! on filesystems without native fork support. It is a small table of typed
//! entries; the adapter writes a FinderInfo entry and, when resources exist,
//! a ResourceFork entry.

/// AppleDouble magic number (`0x00051607`; AppleSingle uses `0x00051600`).
const MAGIC: u32 = 0x0005_1607;

/// Format version 2, the only one modern systems write.
const VERSION: u32 = 0x0002_0000;

/// Fixed header: magic (4) + version (4) + filler (16) + entry count (2).
const HEADER_LEN: usize = 26;

/// Size of one entry descriptor: id (4) + offset (4) + length (4).
const DESCRIPTOR_LEN: usize = 12;

/// Well-known AppleDouble entry ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntryId {
    /// The data fork (unused by the adapter; data lives in the real file).
    DataFork = 1,
    /// The resource fork bytes.
    ResourceFork = 2,
    /// The item's original name.
    RealName = 3,
    /// The 32-byte FinderInfo blob.
    FinderInfo = 9,
}

/// Builder for an AppleDouble container.
#[derive(Debug, Clone, Default)]
pub struct AppleDouble {
    entries: Vec<(EntryId, Vec<u8>)>,
}

impl AppleDouble {
    /// Creates a container with no entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Entries are laid out in insertion order.
    pub fn add_entry(&mut self, id: EntryId, data: Vec<u8>) {
        self.entries.push((id, data));
    }

    /// Number of entries added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the container: header, entry descriptors, then payloads.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let descriptors_len = self.entries.len() * DESCRIPTOR_LEN;
        let payload_len: usize = self.entries.iter().map(|(_, d)| d.len()).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + descriptors_len + payload_len);

        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());

        let mut offset = (HEADER_LEN + descriptors_len) as u32;
        for (id, data) in &self.entries {
            out.extend_from_slice(&(*id as u32).to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            offset += data.len() as u32;
        }
        for (_, data) in &self.entries {
            out.extend_from_slice(data);
        }
        out
    }
}
