//! Repository path handling
//!
//! Paths are `/`-separated sequences of UTF-8 entry names, absolute inside
//! the repository. The canonical form always starts with `/`, never ends
//! with `/` (except the bare root `/`), and contains no empty components.
//!
//! Entry names are non-empty, contain no `/` or NUL, and are never `.` or
//! `..`.

use crate::error::{FsError, Result};

/// Validate a single directory-entry name
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::IllegalName { name: name.into() });
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::IllegalName { name: name.into() });
    }
    Ok(())
}

/// Canonicalize a repository path
///
/// Accepts paths with or without a leading slash and with repeated
/// slashes; produces the canonical absolute form. Rejects components that
/// fail [`validate_name`].
pub fn canonicalize(path: &str) -> Result<String> {
    if path.contains('\0') {
        return Err(FsError::PathSyntax { path: path.into() });
    }
    let mut canonical = String::with_capacity(path.len() + 1);
    for component in path.split('/').filter(|c| !c.is_empty()) {
        validate_name(component).map_err(|_| FsError::PathSyntax { path: path.into() })?;
        canonical.push('/');
        canonical.push_str(component);
    }
    if canonical.is_empty() {
        canonical.push('/');
    }
    Ok(canonical)
}

/// Split a canonical path into its entry names
///
/// The bare root yields no components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Join a canonical directory path and an entry name
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// The parent directory of a canonical path, or None for the root
pub fn dirname(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// The final entry name of a canonical path, or None for the root
pub fn basename(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    path.rfind('/').map(|i| &path[i + 1..])
}

/// True if `ancestor` is `path` itself or a strict ancestor of it
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    if let Some(rest) = path.strip_prefix(ancestor) {
        rest.is_empty() || rest.starts_with('/')
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(canonicalize("/").unwrap(), "/");
        assert_eq!(canonicalize("").unwrap(), "/");
        assert_eq!(canonicalize("a/b").unwrap(), "/a/b");
        assert_eq!(canonicalize("/a//b/").unwrap(), "/a/b");
        assert_eq!(canonicalize("//").unwrap(), "/");
    }

    #[test]
    fn rejects_dot_components_and_nul() {
        assert!(canonicalize("/a/./b").is_err());
        assert!(canonicalize("/a/../b").is_err());
        assert!(canonicalize("/a\0b").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("hello.txt").is_ok());
        assert!(validate_name("日本語").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\0b").is_err());
    }

    #[test]
    fn split_and_join() {
        assert_eq!(components("/a/b/c").collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/a", "x"), "/a/x");
        assert_eq!(dirname("/a/b"), Some("/a"));
        assert_eq!(dirname("/a"), Some("/"));
        assert_eq!(dirname("/"), None);
        assert_eq!(basename("/a/b"), Some("b"));
        assert_eq!(basename("/"), None);
    }

    #[test]
    fn ancestry() {
        assert!(is_ancestor_or_self("/", "/a/b"));
        assert!(is_ancestor_or_self("/a", "/a/b"));
        assert!(is_ancestor_or_self("/a/b", "/a/b"));
        assert!(!is_ancestor_or_self("/a/b", "/a"));
        assert!(!is_ancestor_or_self("/a", "/ab"));
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(parts in prop::collection::vec("[a-z]{1,8}", 0..6)) {
            let raw = format!("/{}", parts.join("//"));
            let once = canonicalize(&raw).unwrap();
            let twice = canonicalize(&once).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert!(once == "/" || !once.ends_with('/'));
        }

        #[test]
        fn join_then_split_round_trips(parts in prop::collection::vec("[a-z0-9._-]{1,8}", 1..6)) {
            let mut p = "/".to_string();
            for part in &parts {
                p = join(&p, part);
            }
            let back: Vec<_> = components(&p).map(str::to_owned).collect();
            prop_assert_eq!(back, parts);
        }
    }
}
