//! Logical path helpers.
//!
//! Logical paths are `/`-separated, start with `/`, and never contain `.`,
//! `..` or empty segments. Backends map them onto their own namespace.

use crate::error::{StorageError, StorageResult};

/// Normalizes a logical path.
///
/// Repeated and trailing separators are collapsed; `.` and `..` segments are
/// rejected so a path can never escape the backend root.
pub fn normalize(path: &str) -> StorageResult<String> {
    if !path.starts_with('/') {
        return Err(StorageError::InvalidPath(format!("{path}: must be absolute")));
    }

    let mut out = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return Err(StorageError::InvalidPath(format!(
                "{path}: illegal segment {segment:?}"
            )));
        }
        out.push('/');
        out.push_str(segment);
    }

    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Returns the parent of a normalized path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Joins a relative suffix onto a base path.
pub fn join(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    format!("{base}/{rest}")
}

/// Iterates over the ancestors of a normalized path, root excluded, shortest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .skip(1)
        .map(move |(i, _)| &path[..i])
        .chain(std::iter::once(path).filter(|p| *p != "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize("/").unwrap(), "/");
    }

    #[test]
    fn normalize_rejects_escapes() {
        assert!(normalize("/a/../b").is_err());
        assert!(normalize("/./a").is_err());
        assert!(normalize("relative/a").is_err());
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("/attachments/", "/aa/bb"), "/attachments/aa/bb");
        assert_eq!(join("/", "db"), "/db");
    }

    #[test]
    fn ancestors_in_order() {
        let all: Vec<_> = ancestors("/a/b/c").collect();
        assert_eq!(all, vec!["/a", "/a/b", "/a/b/c"]);
    }
}
