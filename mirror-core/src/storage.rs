//! Storage-root path resolution.
//!
//! Sources address files with logical, `/`-separated paths relative to the
//! storage root (`"libraries/foo/1.0/foo-1.0.jar"`). [`resolve`] maps such a
//! path to the local filesystem convention and guarantees the result stays
//! inside the root: `..` segments are resolved lexically and may never climb
//! above it, and absolute paths are rejected outright. [`normalize`] gives the
//! canonical spelling of a path, which is the key used for cached digests and
//! liveness marks.

use std::path::{Component, Path, PathBuf};

use crate::error::CoreError;

/// Resolve `logical` under `root`.
///
/// Empty and `.` segments are skipped, `..` pops the previous segment.
/// Returns [`CoreError::PathEscapesRoot`] if the path is absolute or pops past
/// the root, and [`CoreError::InvalidPath`] if nothing is left to name a file.
pub fn resolve(root: &Path, logical: &str) -> Result<PathBuf, CoreError> {
    let segments = clean(logical)?;
    let mut path = root.to_path_buf();
    path.extend(segments);
    Ok(path)
}

/// Canonical `/`-joined form of `logical`, e.g. `"./dir/../a.txt"` → `"a.txt"`.
///
/// Fails exactly when [`resolve`] would.
pub fn normalize(logical: &str) -> Result<String, CoreError> {
    clean(logical).map(|segments| segments.join("/"))
}

fn clean(logical: &str) -> Result<Vec<&str>, CoreError> {
    if logical.starts_with('/') || Path::new(logical).has_root() {
        return Err(escapes(logical));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in logical.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(escapes(logical));
                }
            }
            other => {
                // A segment must be a single plain component on this platform
                // (rejects `C:` prefixes and `\` separators on Windows).
                let mut components = Path::new(other).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => segments.push(other),
                    _ => return Err(escapes(logical)),
                }
            }
        }
    }

    if segments.is_empty() {
        return Err(CoreError::InvalidPath {
            path: logical.to_string(),
        });
    }
    Ok(segments)
}

fn escapes(logical: &str) -> CoreError {
    CoreError::PathEscapesRoot {
        path: logical.to_string(),
    }
}
