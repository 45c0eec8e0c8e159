//! Entries of the virtual directory tree and path handling.
//!
//! Entries are materialised on demand from directory listings; nothing is
//! indexed up front.  An entry's offset is only meaningful for the handle it
//! was read from.

use std::fmt;

use crate::error::{NksError, Result};
use crate::format::TypeHint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
    Unknown,
}

impl From<TypeHint> for EntryKind {
    fn from(hint: TypeHint) -> Self {
        match hint {
            TypeHint::Directory                      => EntryKind::Directory,
            TypeHint::EncryptedFile | TypeHint::File => EntryKind::File,
            TypeHint::Other(_)                       => EntryKind::Unknown,
        }
    }
}

/// A named node in the container tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name:   String,
    pub kind:   EntryKind,
    pub offset: u64,
}

impl Entry {
    /// The implicit top-level directory at offset 0.
    pub fn root() -> Self {
        Self { name: "/".into(), kind: EntryKind::Directory, offset: 0 }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Case-insensitive name comparison.
    pub fn name_matches(&self, name: &str) -> bool {
        fold_case(&self.name) == fold_case(name)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::Directory => write!(f, "{}/", self.name),
            _                    => f.write_str(&self.name),
        }
    }
}

/// Unicode case folding.  Upper-casing first expands characters such as
/// `ß` to `SS`, so `"straße"` and `"STRASSE"` fold alike.
pub fn fold_case(s: &str) -> String {
    s.to_uppercase().to_lowercase()
}

/// Split an archive path into its segments.
///
/// Repeated separators and `.` segments collapse.  Absolute paths and `..`
/// segments are rejected.  An empty result names the root directory.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.starts_with('/') {
        return Err(NksError::InvalidPath(path.to_owned()));
    }
    let mut segments = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".."     => return Err(NksError::InvalidPath(path.to_owned())),
            s        => segments.push(s),
        }
    }
    Ok(segments)
}

/// Join an archive-relative prefix and a child name.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

/// True when `name` is safe to use as a path component on the host file
/// system: non-empty, no separators, not `.` or `..`.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hints_map_to_kinds() {
        assert_eq!(EntryKind::from(TypeHint::Directory), EntryKind::Directory);
        assert_eq!(EntryKind::from(TypeHint::EncryptedFile), EntryKind::File);
        assert_eq!(EntryKind::from(TypeHint::File), EntryKind::File);
        assert_eq!(EntryKind::from(TypeHint::Other(0)), EntryKind::Unknown);
        assert_eq!(EntryKind::from(TypeHint::Other(4)), EntryKind::Unknown);
    }

    #[test]
    fn paths_collapse_separators() {
        assert_eq!(split_path("a//b/./c/").unwrap(), vec!["a", "b", "c"]);
        assert!(split_path("").unwrap().is_empty());
        assert!(split_path("./").unwrap().is_empty());
    }

    #[test]
    fn absolute_and_parent_paths_are_rejected() {
        assert!(matches!(split_path("/x"), Err(NksError::InvalidPath(_))));
        assert!(matches!(split_path("a/../b"), Err(NksError::InvalidPath(_))));
        assert!(matches!(split_path(".."), Err(NksError::InvalidPath(_))));
    }

    #[test]
    fn case_folding_is_unicode_aware() {
        let e = Entry { name: "BAZ.WAV".into(), kind: EntryKind::File, offset: 9 };
        assert!(e.name_matches("baz.wav"));
        assert!(e.name_matches("Baz.Wav"));
        assert!(!e.name_matches("baz.wa"));
        assert_eq!(fold_case("ÄRGER"), fold_case("ärger"));
        assert_eq!(fold_case("Straße"), fold_case("STRASSE"));
    }

    #[test]
    fn component_safety() {
        assert!(is_safe_component("Kick 01.wav"));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("a\\b"));
        assert!(!is_safe_component(""));
    }
}
