use super::helpers::staged_files;
use crate::commands::{CmdMessage, CmdResult};
use crate::enumerate::{CancelFlag, Enumerator};
use crate::error::Result;
use crate::model::SubmissionTarget;
use crate::store::AttachmentStore;

pub fn run(store: &AttachmentStore) -> CmdResult {
    let files = staged_files(store);
    let mut result = CmdResult::default();
    if files.is_empty() {
        result.add_message(CmdMessage::info("No staged files."));
    }
    result.with_listed_files(files)
}

/// Lists files together with the attachment snapshot for `target`.
pub fn with_snapshot(
    store: &AttachmentStore,
    enumerator: &Enumerator,
    target: &SubmissionTarget,
) -> Result<CmdResult> {
    let snapshot = enumerator.enumerate(target, &CancelFlag::new())?;
    let mut result = run(store);

    let flagged = snapshot.files().filter(|f| f.violations.any()).count();
    if flagged > 0 {
        result.add_message(CmdMessage::warning(format!(
            "{} file(s) cannot be posted to {} as is.",
            flagged, target
        )));
    }
    Ok(result.with_snapshot(snapshot))
}
