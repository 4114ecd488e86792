//! Serializers for the legacy macOS dual-fork metadata formats.
//!
//! This crate produces the exact on-disk byte layouts that the Finder and
//! other Carbon-era consumers expect when metadata is carried out-of-band:
//!
//! - [`FinderInfo`]: the fixed 32-byte Finder information blob, including
//!   the 16-bit [`FinderFlags`] bitfield.
//! - [`ResourceFork`]: the classic resource fork container holding typed,
//!   id-addressed binary resources (`'icns'` icons, `'url '` shortcuts).
//! - [`AppleDouble`]: the "`._name`" sidecar container that bundles a
//!   FinderInfo entry and, optionally, a resource fork entry.
//!
//! All serializers are pure: they take values in and return `Vec<u8>` out,
//! with no filesystem access. Multi-byte integers are big-endian throughout,
//! as required by all three formats.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apple_double;
mod finder_info;
mod resource_fork;

pub use apple_double::{AppleDouble, EntryId};
pub use finder_info::{FinderFlags, FinderInfo};
pub use resource_fork::{Resource, ResourceFork};

/// Builds a four-character type code from ASCII bytes (e.g. `fourcc(b"icns")`).
#[inline]
#[must_use]
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}
