//! Hands the selected files to a submission.
//!
//! The submission here copies the files into a directory. It follows the same
//! contract any uploader must: take the selected files, then delete them on
//! success or put them back on failure.

use crate::commands::{CmdMessage, CmdResult, StagedFile};
use crate::error::{Result, StageError};
use crate::model::SubmissionTarget;
use crate::store::record::{remove_quietly, FileRecord};
use crate::store::AttachmentStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Takes the selected files for `target` and copies them into `destination`.
///
/// With `fail` set the copies are made and then rolled back as if the upload
/// had failed, which exercises the put-back path.
pub fn run(
    store: &AttachmentStore,
    target: &SubmissionTarget,
    destination: &Path,
    fail: bool,
) -> Result<CmdResult> {
    if !target.is_well_formed() {
        return Err(StageError::Validation(format!(
            "'{}' is not a valid submission target",
            target
        )));
    }

    let mut result = CmdResult::default();
    let taken = store.take_selected_files(target);
    if taken.is_empty() {
        result.add_message(CmdMessage::info("No selected files to submit."));
        return Ok(result);
    }

    let views: Vec<StagedFile> = taken
        .iter()
        .filter_map(|record| {
            let meta = record.metadata().ok()?;
            Some(StagedFile::from_record(None, record, &meta))
        })
        .collect();

    let outcome = copy_all(&taken, destination).and_then(|written| {
        if fail {
            for path in &written {
                remove_quietly(path);
            }
            return Err(StageError::Validation("submission aborted".into()));
        }
        Ok(written)
    });

    match outcome {
        Ok(written) => {
            let uuids: Vec<Uuid> = views.iter().map(|f| f.uuid).collect();
            store.delete_files(&uuids);
            info!(%target, count = uuids.len(), "submitted staged files");
            result.add_message(CmdMessage::success(format!(
                "Submitted {} file(s) to {}.",
                uuids.len(),
                target
            )));
            result.paths = written;
        }
        Err(err) => {
            warn!(%target, error = %err, "submission failed, putting files back");
            result.add_message(CmdMessage::error(format!(
                "Submission to {} failed: {}",
                target, err
            )));
            if store.put_files_back(&taken) {
                result.add_message(CmdMessage::info(format!(
                    "{} file(s) returned to the staging area.",
                    taken.len()
                )));
            } else {
                result.add_message(CmdMessage::warning(
                    "Some files could not be returned to the staging area.",
                ));
            }
        }
    }

    Ok(result.with_affected_files(views))
}

/// Puts back files that have been taken for longer than `ttl`.
pub fn reclaim(store: &AttachmentStore, ttl: Duration) -> CmdResult {
    let reclaimed = store.reclaim_stale_taken(ttl);
    let mut result = CmdResult::default();
    if !reclaimed.is_empty() {
        result.add_message(CmdMessage::warning(format!(
            "Returned {} abandoned file(s) to the staging area.",
            reclaimed.len()
        )));
    }
    result
}

fn copy_all(taken: &[Arc<FileRecord>], destination: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(destination)?;
    let mut written = Vec::new();

    for record in taken {
        let copied = record
            .metadata()
            .and_then(|meta| {
                let target = free_name(destination, &meta.file_name, &meta.uuid);
                fs::copy(record.data_path(), &target)?;
                Ok(target)
            });

        match copied {
            Ok(path) => written.push(path),
            Err(err) => {
                for path in &written {
                    remove_quietly(path);
                }
                return Err(err);
            }
        }
    }
    Ok(written)
}

fn free_name(dir: &Path, file_name: &str, uuid: &Uuid) -> PathBuf {
    let fallback = uuid.simple().to_string();
    let file_name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&fallback);
    let plain = dir.join(file_name);
    if !plain.exists() {
        return plain;
    }
    let short = uuid.simple().to_string();
    dir.join(format!("{}-{}", &short[..8], file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    fn target() -> SubmissionTarget {
        SubmissionTarget::thread("4chan", "g", 42)
    }

    #[test]
    fn successful_submission_copies_and_deletes() {
        let env = TestEnv::new();
        let a = env.add("a.png", 100, true);
        let keep = env.add("b.png", 200, false);
        let out = env.root.join("out");

        let result = run(&env.store, &target(), &out, false).unwrap();

        assert!(!result.has_errors());
        assert_eq!(result.affected_files[0].uuid, a);
        assert_eq!(fs::read(out.join("a.png")).unwrap(), b"a.png");
        assert!(env.store.get(&a).is_none());
        assert!(env.store.get(&keep).is_some());
    }

    #[test]
    fn failed_submission_puts_files_back() {
        let env = TestEnv::new();
        let a = env.add("a.png", 100, true);
        let out = env.root.join("out");

        let result = run(&env.store, &target(), &out, true).unwrap();

        assert!(result.has_errors());
        assert!(env.store.is_selected(&a));
        assert!(!out.join("a.png").exists());
        let record = env.store.get(&a).unwrap();
        assert!(!env.reopen(&record).metadata().unwrap().is_taken());
    }

    #[test]
    fn nothing_selected() {
        let env = TestEnv::new();
        env.add("a.png", 100, false);
        let result = run(&env.store, &target(), &env.root.join("out"), false).unwrap();
        assert!(result.messages[0].content.contains("No selected files"));
    }

    #[test]
    fn name_collisions_get_a_prefix() {
        let env = TestEnv::new();
        env.add("same.png", 100, true);
        env.add("same.png", 200, true);
        let out = env.root.join("out");

        let result = run(&env.store, &target(), &out, false).unwrap();
        assert_eq!(result.paths.len(), 2);
        assert_ne!(result.paths[0], result.paths[1]);
    }

    #[test]
    fn copies_stay_inside_the_destination() {
        let env = TestEnv::new();
        env.add("a.png", 100, true);
        let out = env.root.join("out");
        let escaped = env.root.join("escaped.png");

        let record = env.store.map_ordered(|_, record, _| Some(Arc::clone(record)));
        // Metadata written by something other than the rename path.
        let mut meta = record[0].metadata().unwrap();
        meta.file_name = escaped.to_string_lossy().into_owned();
        record[0].store_metadata(meta).unwrap();

        let result = run(&env.store, &target(), &out, false).unwrap();

        assert!(!escaped.exists());
        assert_eq!(result.paths, vec![out.join("escaped.png")]);
    }

    #[test]
    fn rename_to_a_path_cannot_escape_the_destination() {
        let env = TestEnv::new();
        let a = env.add("a.png", 100, true);
        let out = env.root.join("out");
        let escaped = env.root.join("escaped.png");

        assert!(env
            .store
            .update_name(&a, &escaped.to_string_lossy())
            .is_err());
        assert!(env.store.update_name(&a, "../escaped.png").is_err());

        let result = run(&env.store, &target(), &out, false).unwrap();
        assert!(!escaped.exists());
        assert_eq!(result.paths, vec![out.join("a.png")]);
    }

    #[test]
    fn malformed_target_is_rejected() {
        let env = TestEnv::new();
        let bad = SubmissionTarget::catalog("4chan", " ");
        assert!(run(&env.store, &bad, &env.root.join("out"), false).is_err());
    }

    #[test]
    fn reclaim_reports_returned_files() {
        let env = TestEnv::new();
        env.add("a.png", 100, true);
        env.store.take_selected_files(&target());

        let result = reclaim(&env.store, Duration::ZERO);
        assert!(result.messages[0].content.contains("Returned 1"));
        assert_eq!(env.store.selected_files_count(), 1);
    }
}
