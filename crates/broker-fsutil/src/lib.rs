//! Create-temp-then-rename atomic file helpers.
//!
//! Every durable write in this workspace (topic config, consumer records,
//! event files) goes through here so a crash mid-write never leaves a
//! half-written file where a reader expects a complete one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

/// Write `content` to `path` by writing to a sibling `.tmp` file and
/// renaming it into place. `rename` is atomic on the same filesystem, so a
/// reader never observes a partially-written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))?;

    Ok(())
}

/// Like [`write_atomic`] but fails with [`AlreadyExists`](std::io::ErrorKind::AlreadyExists)
/// if `path` already has content. Event files are written exactly once and
/// must never be silently overwritten by a retried publish.
pub fn write_atomic_create_new(path: &Path, content: &[u8]) -> Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", path.display());
    }
    write_atomic(path, content)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    path.with_file_name(file_name)
}

pub fn read_to_vec(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(content))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;
    write_atomic(path, &content)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_to_vec(path)? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse JSON from {}", path.display()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// List immediate subdirectory names, sorted ascending. Used to walk date
/// and sequence-bucket directories in order.
pub fn list_dir_names_sorted(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// List `.json` file stems in a directory, sorted ascending.
pub fn list_json_stems_sorted(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut stems = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file()
            && let Some(name) = entry.file_name().to_str()
            && let Some(stem) = name.strip_suffix(".json")
        {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

pub fn delete_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("failed to delete {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.json");
        save_json(&path, &Sample { value: 42 }).expect("save");
        let loaded: Sample = load_json(&path).expect("load").expect("some");
        assert_eq!(loaded, Sample { value: 42 });
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().expect("tempdir");
        let loaded: Option<Sample> = load_json(&dir.path().join("missing.json")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn create_new_refuses_overwrite() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("event.json");
        write_atomic_create_new(&path, b"{}").expect("first write");
        let err = write_atomic_create_new(&path, b"{}").expect_err("second write should fail");
        assert!(err.to_string().contains("refusing to overwrite"));
    }

    #[test]
    fn no_tmp_file_left_behind_after_success() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.json");
        write_atomic(&path, b"{}").expect("write");
        assert!(!dir.path().join("a.json.tmp").exists());
    }

    #[test]
    fn list_dir_names_sorted_is_sorted() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("0002")).unwrap();
        fs::create_dir(dir.path().join("0000")).unwrap();
        fs::create_dir(dir.path().join("0001")).unwrap();
        let names = list_dir_names_sorted(dir.path()).expect("list");
        assert_eq!(names, vec!["0000", "0001", "0002"]);
    }

    #[test]
    fn list_json_stems_strips_extension() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("acme-1.json"), b"{}").unwrap();
        fs::write(dir.path().join("acme-2.json"), b"{}").unwrap();
        fs::write(dir.path().join("ignore.txt"), b"").unwrap();
        let stems = list_json_stems_sorted(dir.path()).expect("list");
        assert_eq!(stems, vec!["acme-1", "acme-2"]);
    }
}
