//! Virtual-entity resolution.
//!
//! Pure path classification: no delegate calls, no filesystem access. A
//! path is one of three things, decided entirely by its last component:
//!
//! - `Icon\r`: the directory-icon slot of the enclosing directory;
//! - `._name`: the AppleDouble sidecar of `name` in the same directory;
//! - anything else: an ordinary path.
//!
//! Classification applies at most once per layer, sidecar before icon slot:
//! `/._Icon\r` is the sidecar of the icon slot of `/`, while `/._._x` is the
//! sidecar of the literal name `._x` and resolves no further.

/// Filename of a directory-icon slot. The trailing carriage return is part
/// of the name; it is what keeps the Finder from displaying the entry.
pub const ICON_FILE_NAME: &str = "Icon\r";

/// Prefix marking an AppleDouble sidecar.
pub const APPLE_DOUBLE_PREFIX: &str = "._";

/// What a path's last component names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualEntity {
    /// A plain delegate-backed path.
    Ordinary,
    /// The `Icon\r` slot of the enclosing directory.
    DirectoryIcon,
    /// A `._name` sidecar.
    AppleDouble,
}

/// One classification step: the entity and the underlying real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// How the last component classified.
    pub entity: VirtualEntity,
    /// The path one layer down: the enclosing directory for an icon slot,
    /// the sidecar's target for an AppleDouble, the path itself otherwise.
    pub real: String,
}

/// Splits a path into (parent, last component). The root has no component.
fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Joins a parent directory and a child name.
pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Classifies `path` and computes its real path, applying one step only.
pub fn resolve(path: &str) -> Resolved {
    let (parent, name) = split(path);
    if name == ICON_FILE_NAME {
        return Resolved {
            entity: VirtualEntity::DirectoryIcon,
            real: if parent.is_empty() {
                "/".to_string()
            } else {
                parent.to_string()
            },
        };
    }
    if let Some(stripped) = name.strip_prefix(APPLE_DOUBLE_PREFIX) {
        return Resolved {
            entity: VirtualEntity::AppleDouble,
            real: join(if parent.is_empty() { "/" } else { parent }, stripped),
        };
    }
    Resolved {
        entity: VirtualEntity::Ordinary,
        real: path.to_string(),
    }
}

/// Full resolution of the synthetic layers above a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The path is an AppleDouble sidecar.
    pub double: bool,
    /// The path is, or is the sidecar of, a directory-icon slot.
    pub icon: bool,
    /// The fully resolved underlying path.
    pub real: String,
}

/// Resolves both layers: sidecar first, then icon slot, each at most once.
///
/// A sidecar whose target is itself `._`-prefixed stops after the first
/// step; only a directory-icon target resolves further.
pub fn resolve_chain(path: &str) -> Resolution {
    let first = resolve(path);
    match first.entity {
        VirtualEntity::Ordinary => Resolution {
            double: false,
            icon: false,
            real: first.real,
        },
        VirtualEntity::DirectoryIcon => Resolution {
            double: false,
            icon: true,
            real: first.real,
        },
        VirtualEntity::AppleDouble => {
            let second = resolve(&first.real);
            if second.entity == VirtualEntity::DirectoryIcon {
                Resolution {
                    double: true,
                    icon: true,
                    real: second.real,
                }
            } else {
                Resolution {
                    double: true,
                    icon: false,
                    real: first.real,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_paths_resolve_to_themselves() {
        let r = resolve("/a/b");
        assert_eq!(r.entity, VirtualEntity::Ordinary);
        assert_eq!(r.real, "/a/b");
        assert_eq!(resolve("/").entity, VirtualEntity::Ordinary);
    }

    #[test]
    fn icon_slot_resolves_to_enclosing_directory() {
        let r = resolve("/Icon\r");
        assert_eq!(r.entity, VirtualEntity::DirectoryIcon);
        assert_eq!(r.real, "/");

        let r = resolve("/docs/Icon\r");
        assert_eq!(r.entity, VirtualEntity::DirectoryIcon);
        assert_eq!(r.real, "/docs");
    }

    #[test]
    fn sidecar_resolves_to_sibling() {
        let r = resolve("/a/._b");
        assert_eq!(r.entity, VirtualEntity::AppleDouble);
        assert_eq!(r.real, "/a/b");

        let r = resolve("/._hello");
        assert_eq!(r.entity, VirtualEntity::AppleDouble);
        assert_eq!(r.real, "/hello");
    }

    #[test]
    fn sidecar_of_icon_slot_resolves_to_directory() {
        let r = resolve_chain("/._Icon\r");
        assert!(r.double);
        assert!(r.icon);
        assert_eq!(r.real, "/");

        let r = resolve_chain("/docs/._Icon\r");
        assert_eq!(r.real, "/docs");
    }

    #[test]
    fn classification_applies_at_most_once_per_layer() {
        // The sidecar of the literal name "._x": no second strip.
        let r = resolve_chain("/._._x");
        assert!(r.double);
        assert!(!r.icon);
        assert_eq!(r.real, "/._x");
    }

    #[test]
    fn resolution_is_idempotent_after_one_chain() {
        for path in ["/._hello", "/Icon\r", "/._Icon\r", "/a/b/._c", "/x"] {
            let real = resolve_chain(path).real;
            assert_eq!(
                resolve(&real).entity,
                VirtualEntity::Ordinary,
                "chain of {path:?} must land on an ordinary path"
            );
        }
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }
}
