//! Finder information blob and flag bits.

use bitflags::bitflags;

/// Total size of a serialized FinderInfo blob: 16 bytes of `FndrFileInfo`
/// followed by 16 bytes of `FndrExtendedFileInfo`.
pub const FINDER_INFO_LEN: usize = 32;

/// Byte offset of the 16-bit flags word within the blob.
const FLAGS_OFFSET: usize = 8;

bitflags! {
    /// The 16-bit Finder flags word (`fdFlags`).
    ///
    /// Only the bits the adapter actually synthesizes are named; the rest
    /// of the word round-trips untouched through [`FinderFlags::from_bits_retain`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FinderFlags: u16 {
        /// `kHasCustomIcon`: the item has a resource-fork icon.
        const HAS_CUSTOM_ICON = 0x0400;
        /// `kIsInvisible`: the Finder hides the item.
        const IS_INVISIBLE = 0x4000;
    }
}

/// The 32-byte Finder information record for a file or directory.
///
/// Layout (all fields big-endian, unused fields zero):
///
/// ```text
/// offset  0  fdType      u32   file type code (files only)
/// offset  4  fdCreator   u32   creator code (files only)
/// offset  8  fdFlags     u16   Finder flags
/// offset 10  fdLocation  4     icon position in window
/// offset 14  fdFldr      u16   reserved
/// offset 16  extended    16    FndrExtendedFileInfo, zeroed
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FinderInfo {
    type_code: u32,
    creator_code: u32,
    flags: FinderFlags,
}

impl FinderInfo {
    /// A FinderInfo record carrying only the given flags.
    #[must_use]
    pub fn with_flags(flags: FinderFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// A FinderInfo record with a type/creator pair in addition to flags.
    #[must_use]
    pub fn with_type_and_creator(type_code: u32, creator_code: u32, flags: FinderFlags) -> Self {
        Self {
            type_code,
            creator_code,
            flags,
        }
    }

    /// The flags word.
    #[must_use]
    pub fn flags(&self) -> FinderFlags {
        self.flags
    }

    /// Serializes the record into its 32-byte on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; FINDER_INFO_LEN];
        out[0..4].copy_from_slice(&self.type_code.to_be_bytes());
        out[4..8].copy_from_slice(&self.creator_code.to_be_bytes());
        out[FLAGS_OFFSET..FLAGS_OFFSET + 2].copy_from_slice(&self.flags.bits().to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_is_always_32_bytes() {
        assert_eq!(FinderInfo::default().to_bytes().len(), FINDER_INFO_LEN);
        assert_eq!(
            FinderInfo::with_flags(FinderFlags::all()).to_bytes().len(),
            FINDER_INFO_LEN
        );
    }

    #[test]
    fn flags_land_at_offset_eight() {
        let info = FinderInfo::with_flags(FinderFlags::IS_INVISIBLE | FinderFlags::HAS_CUSTOM_ICON);
        let bytes = info.to_bytes();
        assert_eq!(&bytes[8..10], &0x4400u16.to_be_bytes());
        // Everything else stays zero.
        assert!(bytes[..8].iter().all(|&b| b == 0));
        assert!(bytes[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn type_and_creator_are_big_endian() {
        let info = FinderInfo::with_type_and_creator(
            crate::fourcc(b"ilht"),
            crate::fourcc(b"MACS"),
            FinderFlags::empty(),
        );
        let bytes = info.to_bytes();
        assert_eq!(&bytes[0..4], b"ilht");
        assert_eq!(&bytes[4..8], b"MACS");
    }

    #[test]
    fn known_flag_values() {
        assert_eq!(FinderFlags::HAS_CUSTOM_ICON.bits(), 0x0400);
        assert_eq!(FinderFlags::IS_INVISIBLE.bits(), 0x4000);
    }
}
