//! A single staged file: its on-disk triplet plus memoized metadata.
//!
//! The metadata is read from disk at most once per [`FileRecord`] and afterwards
//! only changes through the mutation methods below, each of which persists
//! before returning. A failed write rolls the in-memory copy back so memory
//! never runs ahead of disk.
//!
//! All state sits behind a per-record mutex. The store always takes its own lock
//! first and the record lock second; nothing here ever reaches back into the
//! store, so the order cannot invert.

use super::layout::write_atomic;
use crate::error::{Result, StageError};
use crate::model::{plain_file_name, FileMetadata, SubmissionTarget};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct RecordState {
    meta: Option<FileMetadata>,
    taken_at: Option<Instant>,
}

#[derive(Debug)]
pub struct FileRecord {
    data_path: PathBuf,
    meta_path: PathBuf,
    preview_path: PathBuf,
    state: Mutex<RecordState>,
}

impl FileRecord {
    pub fn new(data_path: PathBuf, meta_path: PathBuf, preview_path: PathBuf) -> Self {
        Self {
            data_path,
            meta_path,
            preview_path,
            state: Mutex::new(RecordState::default()),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    pub fn preview_path(&self) -> &Path {
        &self.preview_path
    }

    pub fn has_preview(&self) -> bool {
        self.preview_path.is_file()
    }

    /// Returns the cached metadata, loading it from disk on first access.
    pub fn metadata(&self) -> Result<FileMetadata> {
        let mut state = self.state.lock();
        Self::loaded(&mut state, &self.meta_path).map(|meta| meta.clone())
    }

    pub fn uuid(&self) -> Result<Uuid> {
        self.metadata().map(|meta| meta.uuid)
    }

    fn loaded<'a>(state: &'a mut RecordState, meta_path: &Path) -> Result<&'a mut FileMetadata> {
        let meta = match state.meta.take() {
            Some(meta) => meta,
            None => read_metadata(meta_path)?,
        };
        Ok(state.meta.insert(meta))
    }

    /// Seeds the cache with `meta` and writes it, creating the file if needed.
    pub fn store_metadata(&self, meta: FileMetadata) -> Result<()> {
        if !meta.is_valid() {
            return Err(StageError::Validation(format!(
                "refusing to store invalid metadata for {}",
                meta.uuid
            )));
        }

        let mut state = self.state.lock();
        write_metadata(&self.meta_path, &meta)?;
        state.meta = Some(meta);
        Ok(())
    }

    /// Writes the in-memory metadata back to disk.
    pub fn persist_metadata(&self) -> Result<()> {
        let mut state = self.state.lock();
        let meta = Self::loaded(&mut state, &self.meta_path)?;
        write_metadata(&self.meta_path, meta)
    }

    /// Claims the file for `target` if nobody owns it yet.
    ///
    /// Returns `Ok(false)` without touching anything when the file is already taken.
    pub fn mark_taken(&self, target: &SubmissionTarget) -> Result<bool> {
        let mut state = self.state.lock();
        let meta = Self::loaded(&mut state, &self.meta_path)?;
        if meta.taken_by.is_some() {
            return Ok(false);
        }

        meta.taken_by = Some(target.clone());
        if let Err(err) = write_metadata(&self.meta_path, meta) {
            meta.taken_by = None;
            return Err(err);
        }

        state.taken_at = Some(Instant::now());
        Ok(true)
    }

    /// Returns the file to the free pool. Calling it on a free file is a no-op.
    pub fn mark_untaken(&self) -> Result<()> {
        let mut state = self.state.lock();
        let meta = Self::loaded(&mut state, &self.meta_path)?;
        let Some(previous) = meta.taken_by.take() else {
            state.taken_at = None;
            return Ok(());
        };

        if let Err(err) = write_metadata(&self.meta_path, meta) {
            meta.taken_by = Some(previous);
            return Err(err);
        }

        state.taken_at = None;
        Ok(())
    }

    /// How long the file has been owned by a submission, if it is taken.
    pub fn taken_for(&self) -> Option<Duration> {
        self.state.lock().taken_at.map(|at| at.elapsed())
    }

    pub fn update_selection(&self, selected: bool) -> Result<()> {
        self.mutate(|meta| {
            if meta.selected == selected {
                return false;
            }
            meta.selected = selected;
            true
        })
    }

    pub fn update_spoiler(&self, spoiler: bool) -> Result<()> {
        self.mutate(|meta| {
            if meta.spoiler == spoiler {
                return false;
            }
            meta.spoiler = spoiler;
            true
        })
    }

    /// Renames the file. The name must be a single plain file name.
    pub fn update_name(&self, name: &str) -> Result<()> {
        let Some(name) = plain_file_name(name) else {
            return Err(StageError::Validation(format!(
                "'{}' is not a plain file name",
                name
            )));
        };

        self.mutate(|meta| {
            if meta.file_name == name {
                return false;
            }
            meta.file_name = name.to_string();
            true
        })
    }

    fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut FileMetadata) -> bool,
    {
        let mut state = self.state.lock();
        let meta = Self::loaded(&mut state, &self.meta_path)?;
        let before = meta.clone();
        if !apply(meta) {
            return Ok(());
        }

        if let Err(err) = write_metadata(&self.meta_path, meta) {
            *meta = before;
            return Err(err);
        }
        Ok(())
    }

    /// Replaces the file's bytes, e.g. after a re-encode. Metadata is untouched.
    pub fn overwrite_data(&self, bytes: &[u8]) -> Result<()> {
        let _state = self.state.lock();
        write_atomic(&self.data_path, bytes)
    }

    pub fn write_preview(&self, bytes: &[u8]) -> Result<()> {
        let _state = self.state.lock();
        write_atomic(&self.preview_path, bytes)
    }

    pub fn data_size(&self) -> Result<u64> {
        let meta = fs::metadata(&self.data_path).map_err(StageError::Io)?;
        Ok(meta.len())
    }

    pub(crate) fn files_readable(&self) -> bool {
        fs::File::open(&self.data_path).is_ok() && fs::File::open(&self.meta_path).is_ok()
    }

    /// Removes data, metadata and preview. Failures are logged, never returned.
    pub fn delete_from_disk(&self) {
        for path in [&self.data_path, &self.meta_path, &self.preview_path] {
            remove_quietly(path);
        }
    }
}

impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        match (self.uuid(), other.uuid()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn read_metadata(path: &Path) -> Result<FileMetadata> {
    let bytes = fs::read(path).map_err(|err| StageError::corrupt(path, err.to_string()))?;
    let meta =
        FileMetadata::from_json(&bytes).map_err(|err| StageError::corrupt(path, err.to_string()))?;
    if !meta.is_valid() {
        return Err(StageError::corrupt(
            path,
            format!("failed validation (version {})", meta.version),
        ));
    }
    Ok(meta)
}

fn write_metadata(path: &Path, meta: &FileMetadata) -> Result<()> {
    let bytes = meta.to_json().map_err(StageError::Serialization)?;
    write_atomic(path, &bytes)
}

pub(crate) fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed staged file"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove staged file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::META_VERSION;
    use crate::test_utils::TestEnv;

    #[test]
    fn metadata_is_loaded_once_and_cached() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        let first = record.metadata().unwrap();

        // Cached copy survives the file disappearing.
        fs::remove_file(record.meta_path()).unwrap();
        assert_eq!(record.metadata().unwrap(), first);
    }

    #[test]
    fn corrupt_metadata_is_reported() {
        let env = TestEnv::new();
        let staged = env.stage("cat.png", b"meow");
        fs::write(staged.meta_path(), b"{ not json").unwrap();

        let fresh = env.reopen(&staged);
        let err = fresh.metadata().unwrap_err();
        assert!(matches!(err, StageError::CorruptMetadata { .. }));
    }

    #[test]
    fn wrong_version_is_corrupt() {
        let env = TestEnv::new();
        let staged = env.stage("cat.png", b"meow");
        let mut meta = staged.metadata().unwrap();
        meta.version = META_VERSION + 7;
        fs::write(staged.meta_path(), meta.to_json().unwrap()).unwrap();

        let fresh = env.reopen(&staged);
        assert!(matches!(
            fresh.metadata(),
            Err(StageError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn mark_taken_is_compare_and_set() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        let a = SubmissionTarget::thread("4chan", "g", 1);
        let b = SubmissionTarget::catalog("4chan", "g");

        assert!(record.mark_taken(&a).unwrap());
        assert!(!record.mark_taken(&b).unwrap());
        assert_eq!(record.metadata().unwrap().taken_by, Some(a));
        assert!(record.taken_for().is_some());
    }

    #[test]
    fn taken_state_is_persisted() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        record
            .mark_taken(&SubmissionTarget::catalog("4chan", "g"))
            .unwrap();

        let fresh = env.reopen(&record);
        assert!(fresh.metadata().unwrap().is_taken());
    }

    #[test]
    fn mark_untaken_is_idempotent() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        record.mark_untaken().unwrap();
        record
            .mark_taken(&SubmissionTarget::catalog("4chan", "g"))
            .unwrap();
        record.mark_untaken().unwrap();
        record.mark_untaken().unwrap();

        assert!(!record.metadata().unwrap().is_taken());
        assert!(record.taken_for().is_none());
        assert!(!env.reopen(&record).metadata().unwrap().is_taken());
    }

    #[test]
    fn updates_persist_and_skip_unchanged_values() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");

        record.update_selection(true).unwrap();
        record.update_spoiler(true).unwrap();
        record.update_name("renamed.png").unwrap();

        let on_disk = env.reopen(&record).metadata().unwrap();
        assert!(on_disk.selected);
        assert!(on_disk.spoiler);
        assert_eq!(on_disk.file_name, "renamed.png");
        assert_eq!(on_disk.original_file_name, "cat.png");

        // Unchanged values do not touch the file at all.
        fs::remove_file(record.meta_path()).unwrap();
        record.update_selection(true).unwrap();
        assert!(!record.meta_path().exists());
    }

    #[test]
    fn blank_name_is_rejected() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        assert!(matches!(
            record.update_name("  "),
            Err(StageError::Validation(_))
        ));
    }

    #[test]
    fn names_with_path_components_are_rejected() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        for bad in ["../cat.png", "/tmp/cat.png", "sub/cat.png", ".."] {
            assert!(matches!(
                record.update_name(bad),
                Err(StageError::Validation(_))
            ));
        }
        assert_eq!(record.metadata().unwrap().file_name, "cat.png");
    }

    #[test]
    fn overwrite_data_keeps_metadata() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        let before = record.metadata().unwrap();

        record.overwrite_data(b"re-encoded bytes").unwrap();

        assert_eq!(fs::read(record.data_path()).unwrap(), b"re-encoded bytes");
        assert_eq!(record.data_size().unwrap(), 16);
        assert_eq!(env.reopen(&record).metadata().unwrap(), before);
    }

    #[test]
    fn delete_from_disk_tolerates_missing_files() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        assert!(!record.has_preview());

        record.delete_from_disk();
        record.delete_from_disk();

        assert!(!record.data_path().exists());
        assert!(!record.meta_path().exists());
    }

    #[test]
    fn equality_follows_uuid_not_path() {
        let env = TestEnv::new();
        let record = env.stage("cat.png", b"meow");
        let other = env.stage("dog.png", b"woof");

        assert_eq!(record, env.reopen(&record));
        assert_ne!(record, other);
    }
}
