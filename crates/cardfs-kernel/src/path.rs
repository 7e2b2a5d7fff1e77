//! Request path resolution.
//!
//! Maps the path part of a request URL onto an absolute path under the
//! mount root. Percent-escapes are decoded first, so `%2e%2e` is caught
//! the same way as a literal `..`.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a request path was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path tries to leave the mount root.
    #[error("path escapes mount root")]
    Traversal,

    /// Bad percent-encoding or an embedded NUL.
    #[error("malformed request path")]
    Malformed,
}

/// Resolve `request_path` against `mount_root`.
///
/// A single leading separator is stripped, empty and `.` segments are
/// dropped and `\` counts as a separator. An empty or `/` request path
/// is the mount root itself. Any `..` segment is refused.
pub fn resolve(mount_root: &Path, request_path: &str) -> Result<PathBuf, PathError> {
    let decoded = urlencoding::decode(request_path).map_err(|_| PathError::Malformed)?;
    if decoded.contains('\0') {
        return Err(PathError::Malformed);
    }

    let mut resolved = mount_root.to_path_buf();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::Traversal),
            name => resolved.push(name),
        }
    }
    Ok(resolved)
}

/// Path of `path` below `root`, `/`-joined, empty for `root` itself.
pub fn relative_display(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Component;

    fn root() -> PathBuf {
        PathBuf::from("/sdcard")
    }

    #[test]
    fn test_root_paths() {
        assert_eq!(resolve(&root(), "").unwrap(), root());
        assert_eq!(resolve(&root(), "/").unwrap(), root());
        assert_eq!(resolve(&root(), "//").unwrap(), root());
    }

    #[test]
    fn test_single_separator_join() {
        assert_eq!(
            resolve(&root(), "/a.txt").unwrap(),
            PathBuf::from("/sdcard/a.txt")
        );
        assert_eq!(
            resolve(&root(), "sub//b.txt").unwrap(),
            PathBuf::from("/sdcard/sub/b.txt")
        );
        assert_eq!(
            resolve(&root(), "/sub/./b.txt/").unwrap(),
            PathBuf::from("/sdcard/sub/b.txt")
        );
        assert_eq!(
            resolve(&root(), "sub\\b.txt").unwrap(),
            PathBuf::from("/sdcard/sub/b.txt")
        );
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(
            resolve(&root(), "/My%20Photos/img%231.jpg").unwrap(),
            PathBuf::from("/sdcard/My Photos/img#1.jpg")
        );
    }

    #[test]
    fn test_traversal_rejected() {
        for p in [
            "..",
            "/../etc/passwd",
            "/sub/../../etc",
            "/sub/..",
            "/%2e%2e/etc",
            "/sub/%2E%2E/%2E%2E",
            "..\\windows",
        ] {
            assert_eq!(resolve(&root(), p), Err(PathError::Traversal), "{p}");
        }
    }

    #[test]
    fn test_malformed_rejected() {
        assert_eq!(resolve(&root(), "/a%00b"), Err(PathError::Malformed));
        assert_eq!(resolve(&root(), "/%ff%fe"), Err(PathError::Malformed));
    }

    #[test]
    fn test_resolved_paths_stay_under_root() {
        let inputs = [
            "", "/", "a", "/a/b/c", "./a", "a/./b", "a//b", "/...", "/..a", "/a..",
            "/a/.../b", "%2fa", "/a%2Fb", "/.hidden", "/sub/b.txt",
        ];
        for p in inputs {
            let resolved = resolve(&root(), p).unwrap();
            assert!(resolved.starts_with(root()), "{p} -> {resolved:?}");
            assert!(
                !resolved.components().any(|c| c == Component::ParentDir),
                "{p} -> {resolved:?}"
            );
        }
    }

    #[test]
    fn test_relative_display() {
        let base = Path::new("/sdcard");
        assert_eq!(
            relative_display(base, Path::new("/sdcard/sub/b.txt")).as_deref(),
            Some("sub/b.txt")
        );
        assert_eq!(relative_display(base, base).as_deref(), Some(""));
        assert_eq!(relative_display(base, Path::new("/other")), None);
    }
}
