//! Write-through JSON persistence for snapshots and templates.
//!
//! Each entity is one `<name>.json` file in a directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves the previous version intact.

use crate::error::{EntityKind, Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A directory of JSON documents keyed by name.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create state directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        atomic_write(&self.path_for(name), &contents)
    }

    /// Load every document. Unreadable files are logged and skipped.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut loaded = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|contents| serde_json::from_str::<T>(&contents).map_err(Error::from));
            match parsed {
                Ok(value) => loaded.push(value),
                Err(e) => tracing::warn!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Delete a document. A missing file is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Names become file names, so keep them to a safe character set.
pub fn validate_name(kind: EntityKind, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        value: u32,
    }

    #[test]
    fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path().join("docs")).unwrap();
        store
            .save("a", &Doc { name: "a".into(), value: 1 })
            .unwrap();
        store
            .save("a", &Doc { name: "a".into(), value: 2 })
            .unwrap();

        let docs: Vec<Doc> = store.load_all().unwrap();
        assert_eq!(docs, vec![Doc { name: "a".into(), value: 2 }]);

        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.load_all::<Doc>().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        store
            .save("ok", &Doc { name: "ok".into(), value: 7 })
            .unwrap();

        let docs: Vec<Doc> = store.load_all().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].value, 7);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name(EntityKind::Snapshot, "before-upgrade_v1.2").is_ok());
        for bad in ["", ".hidden", "../escape", "with space", "a/b"] {
            assert!(
                matches!(
                    validate_name(EntityKind::Template, bad),
                    Err(Error::InvalidName { .. })
                ),
                "accepted {:?}",
                bad
            );
        }
    }
}
