//! Filesystem utilities

use std::fs;
use std::path::Path;

use log::info;

/// Create a directory and all of its parents if missing
pub fn create_dir_all(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.is_dir() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Make sure the directory a file will be written into exists
pub fn ensure_parent_dir(file: impl AsRef<Path>) -> std::io::Result<()> {
    match file.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

pub fn path_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// File name without directory or extension, e.g. `train/ponds.csv` -> `ponds`
pub fn file_stem(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_exists() {
        assert!(path_exists("."));
        assert!(!path_exists("/nonexistent/path/12345"));
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested_folders() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a/b/c.csv");
        ensure_parent_dir(&file).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("train/gfs/ponds_2024.csv").as_deref(), Some("ponds_2024"));
        assert_eq!(file_stem(""), None);
    }
}
