use super::helpers::{resolve_selectors, FileSelector};
use crate::commands::{CmdMessage, CmdResult, StagedFile};
use crate::error::Result;
use crate::store::AttachmentStore;

pub fn select(
    store: &AttachmentStore,
    selectors: &[FileSelector],
    selected: bool,
) -> Result<CmdResult> {
    let verb = if selected { "Selected" } else { "Unselected" };
    apply(store, selectors, verb, |uuid| {
        store.update_selection(uuid, selected)
    })
}

pub fn spoiler(
    store: &AttachmentStore,
    selectors: &[FileSelector],
    spoiler: bool,
) -> Result<CmdResult> {
    let verb = if spoiler {
        "Marked as spoiler"
    } else {
        "Unmarked as spoiler"
    };
    apply(store, selectors, verb, |uuid| store.update_spoiler(uuid, spoiler))
}

pub fn rename(store: &AttachmentStore, selector: &FileSelector, name: &str) -> Result<CmdResult> {
    apply(store, std::slice::from_ref(selector), "Renamed", |uuid| {
        store.update_name(uuid, name)
    })
}

fn apply<F>(
    store: &AttachmentStore,
    selectors: &[FileSelector],
    verb: &str,
    mut update: F,
) -> Result<CmdResult>
where
    F: FnMut(&uuid::Uuid) -> Result<bool>,
{
    let files = resolve_selectors(store, selectors)?;
    let mut result = CmdResult::default();

    for file in files {
        if !update(&file.uuid)? {
            result.add_message(CmdMessage::warning(format!(
                "{} is being submitted and cannot be changed",
                file.file_name
            )));
            continue;
        }

        let Some(updated) = refreshed(store, &file) else {
            continue;
        };
        result.add_message(CmdMessage::success(format!(
            "{} {}",
            verb, updated.file_name
        )));
        result.affected_files.push(updated);
    }

    Ok(result)
}

fn refreshed(store: &AttachmentStore, file: &StagedFile) -> Option<StagedFile> {
    let record = store.get(&file.uuid)?;
    let meta = record.metadata().ok()?;
    Some(StagedFile::from_record(file.index, &record, &meta))
}
