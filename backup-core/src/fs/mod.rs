//! Filesystem helpers for the media tree and artifact directory.

pub mod walker;

use std::path::{Component, Path, PathBuf};

/// First free path `dir/<stem><suffix>`, then `dir/<stem>_1<suffix>`, ...
pub fn unique_path(dir: &Path, stem: &str, suffix: &str) -> PathBuf {
    let candidate = dir.join(format!("{}{}", stem, suffix));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, suffix)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Turn an archive-relative path into a relative filesystem path.
///
/// Returns `None` for anything that could escape the destination root:
/// absolute paths, `..`, drive prefixes.
pub fn safe_relative_path(relative: &str) -> Option<PathBuf> {
    if relative.contains('\\') {
        return None;
    }
    let path = Path::new(relative);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
