//! Lexical path helpers shared by the copy engine, rule matcher and auditor.

use std::path::{Path, PathBuf};

use crate::error::CopyError;

/// Returns the shortest lexically equivalent form of `path`.
///
/// Repeated separators and `.` segments are dropped, `..` consumes the
/// preceding segment where one exists, and trailing separators are removed.
/// An empty result is `"."`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// [`clean_path`] for `Path` values.
pub fn clean(path: &Path) -> PathBuf {
    PathBuf::from(clean_path(&path.to_string_lossy()))
}

/// Parent directory of a cleaned relative path, `"."` for top-level entries.
pub fn parent_dir(path: &str) -> String {
    let cleaned = clean_path(path);
    match cleaned.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Joins `rel` onto `base`, rejecting results that leave `base`.
pub fn safe_join(base: &Path, rel: &str) -> Result<PathBuf, CopyError> {
    let cleaned = clean_path(rel);
    let relative = cleaned.trim_start_matches('/');
    let target = if relative == "." || relative.is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    };

    let abs_base = std::path::absolute(base).map_err(|e| CopyError::io(base, e))?;
    let abs_target = std::path::absolute(&target).map_err(|e| CopyError::io(&target, e))?;
    if !clean(&abs_target).starts_with(clean(&abs_base)) {
        return Err(CopyError::EscapesBase {
            base: base.to_path_buf(),
            path: rel.to_string(),
        });
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("."), ".");
        assert_eq!(clean_path("a/b/"), "a/b");
        assert_eq!(clean_path("./a//b/./c"), "a/b/c");
        assert_eq!(clean_path("a/../b"), "b");
        assert_eq!(clean_path("../a"), "../a");
        assert_eq!(clean_path("a/../.."), "..");
        assert_eq!(clean_path("/../a"), "/a");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("pkg/x.txt"), "pkg");
        assert_eq!(parent_dir("pkg/sub/y.txt"), "pkg/sub");
        assert_eq!(parent_dir("top.txt"), ".");
        assert_eq!(parent_dir("/top.txt"), "/");
    }

    #[test]
    fn test_safe_join_stays_inside_base() {
        let base = Path::new("/tmp/ws");
        assert_eq!(safe_join(base, "a/b").unwrap(), PathBuf::from("/tmp/ws/a/b"));
        assert_eq!(safe_join(base, "a/../b").unwrap(), PathBuf::from("/tmp/ws/b"));
        assert_eq!(safe_join(base, ".").unwrap(), PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn test_safe_join_rejects_escape() {
        let err = safe_join(Path::new("/tmp/ws"), "../outside").unwrap_err();
        assert!(matches!(err, CopyError::EscapesBase { .. }));
    }
}
