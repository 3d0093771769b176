//! On-disk layout of the staging area.
//!
//! ```text
//! <root>/
//! ├── attach_files/        attach_file_{uuid}        raw bytes
//! ├── attach_files_meta/   attach_file_meta_{uuid}   JSON FileMetadata
//! └── previews/            preview_{uuid}            optional thumbnail
//! ```
//!
//! Names are derived from the uuid alone so pairing siblings never needs to
//! open a file.

use crate::error::{Result, StageError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const ATTACH_FILE_PREFIX: &str = "attach_file_";
pub const META_FILE_PREFIX: &str = "attach_file_meta_";
pub const PREVIEW_FILE_PREFIX: &str = "preview_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Data,
    Meta,
    Preview,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            FileKind::Data => ATTACH_FILE_PREFIX,
            FileKind::Meta => META_FILE_PREFIX,
            FileKind::Preview => PREVIEW_FILE_PREFIX,
        }
    }
}

pub fn file_name(kind: FileKind, uuid: &Uuid) -> String {
    format!("{}{}", kind.prefix(), uuid)
}

/// Extracts the uuid from a file name of the given kind.
///
/// The meta prefix shares its head with the data prefix, so a data lookup
/// explicitly refuses meta names.
pub fn uuid_from_file_name(kind: FileKind, name: &str) -> Option<Uuid> {
    if kind == FileKind::Data && name.starts_with(META_FILE_PREFIX) {
        return None;
    }
    let rest = name.strip_prefix(kind.prefix())?;
    Uuid::parse_str(rest).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLayout {
    files_dir: PathBuf,
    meta_dir: PathBuf,
    previews_dir: PathBuf,
}

impl StageLayout {
    pub fn new(files_dir: PathBuf, meta_dir: PathBuf, previews_dir: PathBuf) -> Self {
        Self {
            files_dir,
            meta_dir,
            previews_dir,
        }
    }

    /// Standard layout with the three directories as children of `root`.
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("attach_files"),
            root.join("attach_files_meta"),
            root.join("previews"),
        )
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn previews_dir(&self) -> &Path {
        &self.previews_dir
    }

    pub fn data_path(&self, uuid: &Uuid) -> PathBuf {
        self.files_dir.join(file_name(FileKind::Data, uuid))
    }

    pub fn meta_path(&self, uuid: &Uuid) -> PathBuf {
        self.meta_dir.join(file_name(FileKind::Meta, uuid))
    }

    pub fn preview_path(&self, uuid: &Uuid) -> PathBuf {
        self.previews_dir.join(file_name(FileKind::Preview, uuid))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.files_dir, &self.meta_dir, &self.previews_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(StageError::Io)?;
            }
        }
        Ok(())
    }

    /// Generates a uuid whose data and meta names are both unused on disk.
    pub fn unique_uuid(&self) -> Result<Uuid> {
        let taken = self.existing_names()?;
        loop {
            let uuid = Uuid::new_v4();
            if taken.contains(&file_name(FileKind::Data, &uuid))
                || taken.contains(&file_name(FileKind::Meta, &uuid))
            {
                continue;
            }
            return Ok(uuid);
        }
    }

    fn existing_names(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for dir in [&self.files_dir, &self.meta_dir] {
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(dir).map_err(StageError::Io)? {
                let entry = entry.map_err(StageError::Io)?;
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

/// Lists regular files directly inside `dir`. A missing directory is empty.
pub(crate) fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(StageError::Io)? {
        let entry = entry.map_err(StageError::Io)?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Writes `bytes` to `target` through a sibling temp file and a rename.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        StageError::Validation(format!("{} has no parent directory", target.display()))
    })?;
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(StageError::Io)?;
    }

    let tmp = dir.join(format!(".stage-{}.tmp", Uuid::new_v4()));
    fs::write(&tmp, bytes).map_err(StageError::Io)?;
    if let Err(err) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(StageError::Io(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_round_trip_through_uuid_extraction() {
        let id = Uuid::new_v4();
        for kind in [FileKind::Data, FileKind::Meta, FileKind::Preview] {
            let name = file_name(kind, &id);
            assert_eq!(uuid_from_file_name(kind, &name), Some(id));
        }
    }

    #[test]
    fn data_lookup_rejects_meta_names() {
        let id = Uuid::new_v4();
        let meta_name = file_name(FileKind::Meta, &id);
        assert_eq!(uuid_from_file_name(FileKind::Data, &meta_name), None);
    }

    #[test]
    fn garbage_names_yield_nothing() {
        assert_eq!(uuid_from_file_name(FileKind::Data, "attach_file_nope"), None);
        assert_eq!(uuid_from_file_name(FileKind::Preview, "thumbs.db"), None);
    }

    #[test]
    fn atomic_write_leaves_no_tmp_files() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        write_atomic(&target, b"hello").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unique_uuid_avoids_existing_names() {
        let dir = TempDir::new().unwrap();
        let layout = StageLayout::under(dir.path());
        layout.ensure_dirs().unwrap();
        let existing = Uuid::new_v4();
        fs::write(layout.data_path(&existing), b"x").unwrap();

        let fresh = layout.unique_uuid().unwrap();
        assert_ne!(fresh, existing);
    }
}
