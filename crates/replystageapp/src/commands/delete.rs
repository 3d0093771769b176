use super::helpers::{resolve_selectors, staged_files, FileSelector};
use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::store::AttachmentStore;

/// Deletes the selected files, free or taken.
pub fn run(store: &AttachmentStore, selectors: &[FileSelector]) -> Result<CmdResult> {
    let files = resolve_selectors(store, selectors)?;
    let mut result = CmdResult::default();

    for file in files {
        if store.delete_file(&file.uuid) == 0 {
            continue;
        }
        result.add_message(CmdMessage::success(format!("Deleted {}", file.file_name)));
        result.affected_files.push(file);
    }

    Ok(result)
}

/// Deletes every free, selected file.
pub fn selected(store: &AttachmentStore) -> CmdResult {
    let doomed: Vec<_> = staged_files(store)
        .into_iter()
        .filter(|f| f.selected && !f.is_taken())
        .collect();
    let deleted = store.delete_selected_files();
    summarize(deleted, "selected ").with_affected_files(doomed)
}

/// Deletes everything in the staging area.
pub fn all(store: &AttachmentStore) -> CmdResult {
    let doomed = staged_files(store);
    let deleted = store.delete_all_files();
    summarize(deleted, "").with_affected_files(doomed)
}

fn summarize(deleted: usize, what: &str) -> CmdResult {
    let mut result = CmdResult::default();
    if deleted == 0 {
        result.add_message(CmdMessage::info(format!("No {}files to delete.", what)));
    } else {
        result.add_message(CmdMessage::success(format!(
            "Deleted {} {}file(s).",
            deleted, what
        )));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn deletes_by_selector() {
        let env = TestEnv::new();
        let a = env.add("a.png", 100, false);
        let b = env.add("b.png", 200, false);

        let result = run(&env.store, &[FileSelector::Index(2)]).unwrap();

        assert_eq!(result.affected_files[0].uuid, b);
        assert!(env.store.get(&b).is_none());
        assert!(env.store.get(&a).is_some());
    }

    #[test]
    fn deletes_selected_only() {
        let env = TestEnv::new();
        let keep = env.add("keep.png", 100, false);
        env.add("gone.png", 200, true);

        let result = selected(&env.store);

        assert_eq!(result.affected_files.len(), 1);
        assert!(result.messages[0].content.contains("Deleted 1 selected"));
        assert_eq!(env.store.total_files_count(), 1);
        assert!(env.store.get(&keep).is_some());
    }

    #[test]
    fn delete_all_on_empty_store() {
        let env = TestEnv::new();
        let result = all(&env.store);
        assert!(result.messages[0].content.contains("No files to delete"));
    }
}
