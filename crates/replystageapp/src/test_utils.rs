use crate::import::Importer;
use crate::store::layout::StageLayout;
use crate::store::record::FileRecord;
use crate::store::AttachmentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    // We keep _temp_dir to ensure the directory is not dropped until the test is done
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub layout: StageLayout,
    pub importer: Importer,
    pub store: Arc<AttachmentStore>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let layout = StageLayout::under(&root);
        layout.ensure_dirs().expect("failed to create stage dirs");
        Self {
            _temp_dir: temp_dir,
            importer: Importer::new(layout.clone()),
            store: Arc::new(AttachmentStore::new()),
            layout,
            root,
        }
    }

    /// Writes a new staged file to disk without adding it to the store.
    pub fn stage(&self, name: &str, bytes: &[u8]) -> FileRecord {
        self.importer.stage_bytes(name, bytes).expect("failed to stage file")
    }

    pub fn stage_at(&self, name: &str, added_on: i64) -> FileRecord {
        self.importer
            .stage_bytes_at(name, name.as_bytes(), added_on)
            .expect("failed to stage file")
    }

    /// Stages a file, optionally selects it, and adds it to the store.
    pub fn add(&self, name: &str, added_on: i64, selected: bool) -> uuid::Uuid {
        let record = self.stage_at(name, added_on);
        record.update_selection(selected).expect("failed to select");
        let uuid = record.uuid().expect("fresh record has metadata");
        assert!(self.store.add_new_file(record), "add_new_file rejected {name}");
        uuid
    }

    /// A second handle on the same triplet with an empty metadata cache.
    pub fn reopen(&self, record: &FileRecord) -> FileRecord {
        FileRecord::new(
            record.data_path().to_path_buf(),
            record.meta_path().to_path_buf(),
            record.preview_path().to_path_buf(),
        )
    }
}
