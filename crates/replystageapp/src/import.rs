//! Creates new staged files on disk.
//!
//! The importer writes the data file first and the metadata second, so a crash
//! in between leaves an unpaired data file that reconciliation removes. If the
//! metadata write fails the data file is removed straight away.
//!
//! The returned [`FileRecord`] is not yet part of any store; callers hand it to
//! [`AttachmentStore::add_new_file`](crate::store::AttachmentStore::add_new_file).

use crate::error::{Result, StageError};
use crate::model::{plain_file_name, FileMetadata};
use crate::store::layout::{write_atomic, StageLayout};
use crate::store::record::{remove_quietly, FileRecord};
use chrono::Utc;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

pub struct Importer {
    layout: StageLayout,
}

impl Importer {
    pub fn new(layout: StageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn stage_bytes(&self, original_name: &str, bytes: &[u8]) -> Result<FileRecord> {
        self.stage_bytes_at(original_name, bytes, Utc::now().timestamp_millis())
    }

    /// Copies a file from anywhere on disk into the staging area.
    pub fn stage_path(&self, source: &Path) -> Result<FileRecord> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StageError::Validation(format!("{} has no usable file name", source.display()))
            })?
            .to_string();
        let bytes = fs::read(source).map_err(StageError::Io)?;
        self.stage_bytes(&name, &bytes)
    }

    pub fn stage_bytes_at(
        &self,
        original_name: &str,
        bytes: &[u8],
        added_on: i64,
    ) -> Result<FileRecord> {
        let name = display_name(original_name)?;
        self.layout.ensure_dirs()?;

        let uuid = self.layout.unique_uuid()?;
        let record = FileRecord::new(
            self.layout.data_path(&uuid),
            self.layout.meta_path(&uuid),
            self.layout.preview_path(&uuid),
        );

        write_atomic(record.data_path(), bytes)?;
        if let Err(err) = record.store_metadata(FileMetadata::new(uuid, name, added_on)) {
            error!(uuid = %uuid, error = %err, "failed to write metadata for new staged file");
            remove_quietly(record.data_path());
            remove_quietly(record.meta_path());
            return Err(err);
        }

        debug!(uuid = %uuid, size = bytes.len(), "staged new file");
        Ok(record)
    }
}

fn display_name(original_name: &str) -> Result<String> {
    Path::new(original_name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(plain_file_name)
        .map(str::to_string)
        .ok_or_else(|| {
            StageError::Validation(format!("'{}' is not a usable file name", original_name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stages_data_and_metadata_under_uuid_names() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(StageLayout::under(dir.path()));

        let record = importer.stage_bytes("photo.jpg", b"jpeg").unwrap();
        let meta = record.metadata().unwrap();

        assert_eq!(record.data_path(), importer.layout().data_path(&meta.uuid));
        assert_eq!(record.meta_path(), importer.layout().meta_path(&meta.uuid));
        assert_eq!(fs::read(record.data_path()).unwrap(), b"jpeg");
        assert_eq!(meta.original_file_name, "photo.jpg");
        assert!(!meta.selected);
        assert!(meta.added_on > 0);
    }

    #[test]
    fn directory_components_are_stripped_from_names() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(StageLayout::under(dir.path()));
        let record = importer.stage_bytes("../../etc/cat.gif", b"gif").unwrap();
        assert_eq!(record.metadata().unwrap().file_name, "cat.gif");
    }

    #[test]
    fn blank_names_are_rejected_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let layout = StageLayout::under(dir.path());
        let importer = Importer::new(layout.clone());

        assert!(matches!(
            importer.stage_bytes("   ", b"x"),
            Err(StageError::Validation(_))
        ));
        assert!(!layout.files_dir().exists() || fs::read_dir(layout.files_dir()).unwrap().count() == 0);
    }

    #[test]
    fn stage_path_copies_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("clip.webm");
        fs::write(&src, b"webm").unwrap();

        let importer = Importer::new(StageLayout::under(&dir.path().join("stage")));
        let record = importer.stage_path(&src).unwrap();

        assert_eq!(record.metadata().unwrap().file_name, "clip.webm");
        assert!(src.exists());
    }
}
