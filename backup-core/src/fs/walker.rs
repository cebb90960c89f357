//! Media tree traversal.
//!
//! Collects regular files under a root with their paths relative to it.
//! Unreadable entries are reported as warnings instead of aborting the walk.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Subtrees skipped entirely (e.g. a backups directory nested in the media root)
    pub exclude_dirs: Vec<PathBuf>,
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to their target; links to directories and broken
    /// links yield `None`.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let size = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                _ => return Ok(None),
            }
        } else if raw_metadata.is_file() {
            raw_metadata.len()
        } else {
            return Ok(None);
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
        }))
    }

    /// Archive-style relative path with `/` separators.
    pub fn archive_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Result of a tolerant walk
#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<FileInfo>,
    pub warnings: Vec<String>,
}

/// Walk a directory tree and collect all regular files.
///
/// A missing root yields an empty result. Entries that cannot be read are
/// skipped and recorded in `warnings`.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> WalkResult {
    let mut result = WalkResult::default();
    if !root.exists() {
        return result;
    }

    let excluded: Vec<PathBuf> = options
        .exclude_dirs
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, &excluded));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let msg = format!("Could not read media entry: {}", e);
                tracing::warn!("[Media] {}", msg);
                result.warnings.push(msg);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match FileInfo::from_entry(&entry, root) {
            Ok(Some(info)) => result.files.push(info),
            Ok(None) => {}
            Err(e) => {
                let msg = format!("Could not stat {}: {}", entry.path().display(), e);
                tracing::warn!("[Media] {}", msg);
                result.warnings.push(msg);
            }
        }
    }

    result
}

/// Calculate total size of all files in a directory
pub fn calculate_total_size(root: &Path, options: &WalkOptions) -> u64 {
    walk_directory(root, options).files.iter().map(|f| f.size).sum()
}

fn is_excluded(entry: &DirEntry, excluded: &[PathBuf]) -> bool {
    if excluded.is_empty() || !entry.file_type().is_dir() {
        return false;
    }
    let path = entry
        .path()
        .canonicalize()
        .unwrap_or_else(|_| entry.path().to_path_buf());
    excluded.iter().any(|ex| path == *ex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = walk_directory(temp_dir.path(), &WalkOptions::default());
        assert!(result.files.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_walk_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = walk_directory(&temp_dir.path().join("nope"), &WalkOptions::default());
        assert!(result.files.is_empty());
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("docs/2024"))?;
        fs::write(temp_dir.path().join("logo.png"), b"png")?;
        fs::write(temp_dir.path().join("docs/2024/license.pdf"), b"pdf")?;

        let result = walk_directory(temp_dir.path(), &WalkOptions::default());
        let mut paths: Vec<String> = result.files.iter().map(|f| f.archive_path()).collect();
        paths.sort();
        assert_eq!(paths, vec!["docs/2024/license.pdf", "logo.png"]);

        Ok(())
    }

    #[test]
    fn test_excluded_subtree_is_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let backups = temp_dir.path().join("backups");
        fs::create_dir_all(&backups)?;
        fs::write(backups.join("old_full.zip"), b"zip")?;
        fs::write(temp_dir.path().join("avatar.jpg"), b"jpg")?;

        let options = WalkOptions {
            exclude_dirs: vec![backups],
            ..WalkOptions::default()
        };
        let result = walk_directory(temp_dir.path(), &options);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].archive_path(), "avatar.jpg");

        Ok(())
    }

    #[test]
    fn test_calculate_total_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file1.txt"), b"12345")?; // 5 bytes
        fs::write(temp_dir.path().join("file2.txt"), b"1234567")?; // 7 bytes

        let total = calculate_total_size(temp_dir.path(), &WalkOptions::default());
        assert_eq!(total, 12);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_to_directories_are_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let target = temp_dir.path().join("real");
        fs::create_dir(&target)?;
        fs::write(target.join("a.txt"), b"a")?;
        std::os::unix::fs::symlink(&target, temp_dir.path().join("link"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("gone"), temp_dir.path().join("broken"))?;

        let result = walk_directory(temp_dir.path(), &WalkOptions::default());
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].archive_path(), "real/a.txt");

        Ok(())
    }
}
