//! Path helpers shared by the registries, the config and the compiler.
//!
//! `Path::join` discards the base whenever the joined part is absolute, which
//! is the wrong behaviour for routes: a URL path like `/about/` must land
//! *inside* the output root, not at the filesystem root. [`concat`] joins the
//! way string concatenation with separators would:
//!
//! ```text
//! Path::new("/out").join("/about")   →  /about
//! concat("/out", ["/about"])         →  /out/about
//! ```
//!
//! [`contains`] is the safety gate in front of every write. Both helpers are
//! purely lexical; nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Join `parts` onto `base`, treating every part as relative even when it
/// starts with a separator.
pub fn concat<P: AsRef<Path>>(base: &Path, parts: impl IntoIterator<Item = P>) -> PathBuf {
    let mut joined = base.to_path_buf();
    for part in parts {
        for component in part.as_ref().components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {}
                other => joined.push(other.as_os_str()),
            }
        }
    }
    joined
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment where one exists.
///
/// Leading `..` segments of a relative path are kept; `..` directly under the
/// root is dropped, mirroring how `/..` resolves to `/`.
pub fn clean(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Make `path` absolute against the current directory and clean it.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    Ok(clean(&std::path::absolute(path)?))
}

/// True iff `candidate` lies at or below `base`.
///
/// Equivalent to computing `candidate` relative to `base` and checking that
/// the result does not start with a `..` segment.
pub fn contains(base: &Path, candidate: &Path) -> bool {
    clean(candidate).starts_with(clean(base))
}

/// Path of `path` relative to `base`, or `None` when it is not below `base`.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    clean(path)
        .strip_prefix(clean(base))
        .ok()
        .map(Path::to_path_buf)
}

/// Render a relative path with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
