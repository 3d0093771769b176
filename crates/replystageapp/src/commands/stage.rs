use crate::commands::{CmdMessage, CmdResult, StagedFile};
use crate::error::Result;
use crate::import::Importer;
use crate::store::record::FileRecord;
use crate::store::AttachmentStore;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// Copies each source into the staging area and adds it to the store.
///
/// A file that cannot be staged is reported and skipped; the others still go in.
pub fn run<P: AsRef<Path>>(
    store: &AttachmentStore,
    importer: &Importer,
    sources: &[P],
    select: bool,
) -> Result<CmdResult> {
    let mut result = CmdResult::default();

    for source in sources {
        let source = source.as_ref();
        let record = match importer.stage_path(source) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %source.display(), error = %err, "failed to stage file");
                result.add_message(CmdMessage::error(format!(
                    "Could not stage {}: {}",
                    source.display(),
                    err
                )));
                continue;
            }
        };

        if select {
            if let Err(err) = record.update_selection(true) {
                record.delete_from_disk();
                result.add_message(CmdMessage::error(format!(
                    "Could not select {}: {}",
                    source.display(),
                    err
                )));
                continue;
            }
        }

        let meta = record.metadata()?;
        let view = StagedFile::from_record(None, &record, &meta);
        if !admit(store, record, &meta.uuid) {
            result.add_message(CmdMessage::error(format!(
                "Staged file for {} was rejected",
                source.display()
            )));
            continue;
        }

        result.add_message(CmdMessage::success(format!(
            "Staged {}",
            meta.file_name
        )));
        result.affected_files.push(view);
    }

    Ok(result)
}

/// Adds `record` to the store. When the store refuses it the staged files are
/// removed, unless they belong to a record the store already holds.
fn admit(store: &AttachmentStore, record: FileRecord, uuid: &Uuid) -> bool {
    let leftover = FileRecord::new(
        record.data_path().to_path_buf(),
        record.meta_path().to_path_buf(),
        record.preview_path().to_path_buf(),
    );
    if store.add_new_file(record) {
        return true;
    }
    if store.get(uuid).is_none() {
        warn!(%uuid, "removing staged file the store rejected");
        leftover.delete_from_disk();
    }
    false
}
