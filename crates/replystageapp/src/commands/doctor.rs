use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::store::{AttachmentStore, StageLayout};

pub fn run(store: &AttachmentStore, layout: &StageLayout) -> Result<CmdResult> {
    let report = store.repair_from_disk(layout)?;
    let mut result = CmdResult::default();

    if report.is_clean() {
        result.add_message(CmdMessage::success(format!(
            "No inconsistencies found ({} staged file(s)).",
            report.restored.len()
        )));
        return Ok(result);
    }

    result.add_message(CmdMessage::warning("Inconsistencies found and fixed:"));
    for discarded in &report.discarded {
        result.add_message(CmdMessage::info(format!(
            "  - Discarded {}: {}.",
            discarded.uuid, discarded.reason
        )));
    }
    if !report.orphans_removed.is_empty() {
        result.add_message(CmdMessage::info(format!(
            "  - Removed {} stray file(s).",
            report.orphans_removed.len()
        )));
    }
    result.paths = report.orphans_removed;
    Ok(result)
}
