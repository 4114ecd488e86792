//! Synthetic content: Finder flags, resource forks and AppleDouble bytes.
//!
//! Nothing here exists in the delegate's namespace. The provider derives
//! every byte on demand from at most three delegate capabilities (finder
//! flags, icon data, webloc URL), which is what keeps `readdir`, `getattr`,
//! `open`/`read` and `getxattr` mutually consistent: they all go through the
//! same functions.

use std::sync::Arc;

use finderfs_appledouble::{
    fourcc, AppleDouble, EntryId, FinderFlags, FinderInfo, Resource, ResourceFork,
};
use tracing::trace;

use crate::delegate::{Capabilities, Delegate};
use crate::resolver::{self, VirtualEntity, ICON_FILE_NAME};

/// Resource id of a `'icns'` custom icon (`kCustomIconResource`).
const CUSTOM_ICON_RESOURCE_ID: i16 = -16455;

/// Resource id historically used for `'url '` resources in webloc files.
const WEBLOC_URL_RESOURCE_ID: i16 = 256;

/// Derives synthetic Finder metadata from a delegate's capabilities.
#[derive(Clone)]
pub(crate) struct SyntheticProvider {
    delegate: Arc<dyn Delegate>,
    caps: Capabilities,
}

impl SyntheticProvider {
    pub(crate) fn new(delegate: Arc<dyn Delegate>, caps: Capabilities) -> Self {
        Self { delegate, caps }
    }

    /// Finder flags at `path`. `icon_slot` marks paths classified as a
    /// directory-icon, which are always invisible.
    ///
    /// When the delegate reports flags itself they are OR'd in verbatim;
    /// only a delegate without a flags capability gets the has-custom-icon
    /// bit inferred from its icon data.
    pub(crate) fn finder_flags(&self, path: &str, icon_slot: bool) -> FinderFlags {
        let mut flags = FinderFlags::empty();
        if icon_slot {
            flags |= FinderFlags::IS_INVISIBLE;
        }
        if self.caps.contains(Capabilities::FINDER_FLAGS) {
            flags |= FinderFlags::from_bits_retain(self.delegate.finder_flags(path));
        } else if self.caps.contains(Capabilities::ICON_DATA)
            && self
                .delegate
                .icon_data(path)
                .is_some_and(|data| !data.is_empty())
        {
            flags |= FinderFlags::HAS_CUSTOM_ICON;
        }
        flags
    }

    /// Whether `path` carries a custom icon (and therefore an icon slot).
    pub(crate) fn has_custom_icon(&self, path: &str) -> bool {
        self.finder_flags(path, false)
            .contains(FinderFlags::HAS_CUSTOM_ICON)
    }

    /// Serialized resource fork for `path`, or `None` when it would be empty.
    pub(crate) fn resource_fork(&self, path: &str) -> Option<Vec<u8>> {
        let mut fork = ResourceFork::new();

        if path.ends_with(".webloc") && self.caps.contains(Capabilities::WEBLOC_URL) {
            if let Some(url) = self.delegate.webloc_url(path) {
                fork.add(Resource::new(
                    fourcc(b"url "),
                    WEBLOC_URL_RESOURCE_ID,
                    url.into_bytes(),
                ));
            }
        }

        if self.caps.contains(Capabilities::ICON_DATA) {
            if let Some(data) = self.delegate.icon_data(path) {
                if !data.is_empty() {
                    fork.add(Resource::new(fourcc(b"icns"), CUSTOM_ICON_RESOURCE_ID, data));
                }
            }
        }

        if fork.is_empty() {
            None
        } else {
            Some(fork.to_bytes())
        }
    }

    /// AppleDouble bytes for the sidecar whose target is `target` (the path
    /// with the `._` prefix already stripped, e.g. `/hello` or `/Icon\r`).
    ///
    /// A directory-icon target contributes the invisible bit and resolves to
    /// the enclosing directory for everything else. Returns `None` when
    /// there is nothing to carry (no flags and no fork).
    pub(crate) fn apple_double(&self, target: &str) -> Option<Vec<u8>> {
        let resolved = resolver::resolve(target);
        let (real, icon_slot) = if resolved.entity == VirtualEntity::DirectoryIcon {
            (resolved.real, true)
        } else {
            (target.to_string(), false)
        };

        let flags = self.finder_flags(&real, icon_slot);
        let fork = self.resource_fork(&real);
        if flags.is_empty() && fork.is_none() {
            return None;
        }

        let mut double = AppleDouble::new();
        double.add_entry(EntryId::FinderInfo, FinderInfo::with_flags(flags).to_bytes());
        if let Some(fork_bytes) = fork {
            double.add_entry(EntryId::ResourceFork, fork_bytes);
        }
        trace!(target, entries = double.len(), "synthesized sidecar");
        Some(double.to_bytes())
    }

    /// Augments a directory listing with the synthetic names visible under
    /// `path` in "list double files" mode: a `._` sidecar per member with a
    /// custom icon, and the icon slot pair for the directory itself.
    pub(crate) fn augment_listing(&self, path: &str, names: &mut Vec<String>) {
        let mut extra = Vec::new();
        for name in names.iter() {
            let full = resolver::join(path, name);
            if self.has_custom_icon(&full) {
                extra.push(format!("._{name}"));
            }
        }
        if self.has_custom_icon(path) {
            extra.push(ICON_FILE_NAME.to_string());
            extra.push(format!("._{ICON_FILE_NAME}"));
        }
        names.extend(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ICON_SLOT_PATH: &str = "/Icon\r";

    struct IconDelegate;

    impl Delegate for IconDelegate {
        fn capabilities(&self) -> Capabilities {
            Capabilities::ICON_DATA | Capabilities::WEBLOC_URL
        }

        fn icon_data(&self, path: &str) -> Option<Vec<u8>> {
            (path == "/hello" || path == "/").then(|| b"ICON".to_vec())
        }

        fn webloc_url(&self, path: &str) -> Option<String> {
            (path == "/link.webloc").then(|| "https://example.com/".to_string())
        }
    }

    struct FlagDelegate;

    impl Delegate for FlagDelegate {
        fn capabilities(&self) -> Capabilities {
            Capabilities::FINDER_FLAGS | Capabilities::ICON_DATA
        }

        fn finder_flags(&self, _path: &str) -> u16 {
            0x0001 // kIsOnDesk, passed through verbatim
        }

        fn icon_data(&self, _path: &str) -> Option<Vec<u8>> {
            Some(b"ICON".to_vec())
        }
    }

    fn provider(delegate: impl Delegate + 'static) -> SyntheticProvider {
        let delegate: Arc<dyn Delegate> = Arc::new(delegate);
        let caps = delegate.capabilities();
        SyntheticProvider::new(delegate, caps)
    }

    #[test]
    fn icon_data_implies_custom_icon_flag() {
        let p = provider(IconDelegate);
        assert!(p.finder_flags("/hello", false).contains(FinderFlags::HAS_CUSTOM_ICON));
        assert!(p.finder_flags("/other", false).is_empty());
    }

    #[test]
    fn delegate_flags_suppress_icon_inference() {
        // With a flags capability present, the icon check never runs.
        let p = provider(FlagDelegate);
        let flags = p.finder_flags("/x", false);
        assert_eq!(flags.bits(), 0x0001);
        assert!(!flags.contains(FinderFlags::HAS_CUSTOM_ICON));
    }

    #[test]
    fn icon_slot_is_always_invisible() {
        let p = provider(IconDelegate);
        assert!(p.finder_flags("/other", true).contains(FinderFlags::IS_INVISIBLE));
    }

    #[test]
    fn webloc_fork_carries_the_url() {
        let p = provider(IconDelegate);
        let fork = p.resource_fork("/link.webloc").expect("fork expected");
        let url = b"https://example.com/";
        assert!(fork
            .windows(url.len())
            .any(|w| w == url));
    }

    #[test]
    fn fork_absent_without_sources() {
        let p = provider(IconDelegate);
        assert!(p.resource_fork("/other").is_none());
    }

    #[test]
    fn sidecar_absent_when_nothing_to_carry() {
        let p = provider(IconDelegate);
        assert!(p.apple_double("/other").is_none());
        assert!(p.apple_double("/hello").is_some());
    }

    #[test]
    fn sidecar_of_icon_slot_describes_the_directory() {
        let p = provider(IconDelegate);
        // "/" has icon data, so its icon slot's sidecar exists and is
        // non-trivial (FinderInfo + icns fork).
        let bytes = p.apple_double(ICON_SLOT_PATH).expect("sidecar");
        assert!(bytes.len() > 26 + 12);
    }

    #[test]
    fn listing_gains_double_names_and_icon_pair() {
        let p = provider(IconDelegate);
        let mut names = vec!["hello".to_string(), "other".to_string()];
        p.augment_listing("/", &mut names);
        assert!(names.contains(&"._hello".to_string()));
        assert!(!names.contains(&"._other".to_string()));
        assert!(names.contains(&"Icon\r".to_string()));
        assert!(names.contains(&"._Icon\r".to_string()));
    }

    #[test]
    fn listing_unchanged_without_icons() {
        struct Plain;
        impl Delegate for Plain {}
        let p = provider(Plain);
        let mut names = vec!["a".to_string()];
        p.augment_listing("/dir", &mut names);
        assert_eq!(names, vec!["a".to_string()]);
    }
}
