use super::layout::{list_files, uuid_from_file_name, FileKind, StageLayout};
use super::record::{remove_quietly, FileRecord};
use super::AttachmentStore;
use crate::error::Result;
use crate::model::FileMetadata;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a reconciliation pass found and changed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
    pub restored: Vec<Uuid>,
    pub discarded: Vec<DiscardedFile>,
    pub orphans_removed: Vec<PathBuf>,
}

impl ReconcileReport {
    /// True when nothing had to be discarded or cleaned up.
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty() && self.orphans_removed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscardedFile {
    pub uuid: Uuid,
    pub reason: String,
}

#[derive(Default)]
struct Scan {
    data: BTreeMap<Uuid, PathBuf>,
    meta: BTreeMap<Uuid, PathBuf>,
    previews: BTreeMap<Uuid, PathBuf>,
    strays: Vec<PathBuf>,
}

impl AttachmentStore {
    /// Rebuilds the index from what is on disk under `layout`.
    ///
    /// Data and metadata files are paired by the uuid in their names. A pair is
    /// discarded, all three files deleted, when the metadata is missing,
    /// unreadable, invalid, carries another uuid, or is marked taken: a taken
    /// file left over from a previous run belongs to a submission that no longer
    /// exists. Files matching no naming pattern and unpaired metadata or
    /// previews are removed.
    ///
    /// The whole pass runs under the store lock and replaces the previous
    /// content. If a directory cannot be scanned the staging area is wiped and
    /// the store left empty. Either way exactly one change notice is published.
    ///
    /// Run this once, at cold start. On a store already in use call
    /// [`repair_from_disk`](Self::repair_from_disk) instead.
    pub fn reconcile_from_disk(&self, layout: &StageLayout) -> Result<ReconcileReport> {
        let mut records = self.records.lock();
        self.rebuild(&mut records, layout, HashMap::new())
    }

    /// Same pass as [`reconcile_from_disk`](Self::reconcile_from_disk) for a
    /// store that is already serving submissions.
    ///
    /// Records currently taken in this process are kept as they are, same
    /// handle included, so their submission can still delete them or put them
    /// back. Only taken records nobody here holds are treated as leftovers.
    pub fn repair_from_disk(&self, layout: &StageLayout) -> Result<ReconcileReport> {
        let mut records = self.records.lock();
        let held: HashMap<Uuid, Arc<FileRecord>> = self
            .load_entries(&mut records)
            .into_iter()
            .filter(|(record, meta)| meta.is_taken() && record.taken_for().is_some())
            .map(|(record, meta)| (meta.uuid, record))
            .collect();
        self.rebuild(&mut records, layout, held)
    }

    fn rebuild(
        &self,
        records: &mut Vec<Arc<FileRecord>>,
        layout: &StageLayout,
        mut held: HashMap<Uuid, Arc<FileRecord>>,
    ) -> Result<ReconcileReport> {
        let scan = match scan(layout) {
            Ok(scan) => scan,
            Err(err) => {
                error!(error = %err, "staging area scan failed, wiping it");
                wipe(layout);
                records.clear();
                self.events.publish(Vec::new());
                return Err(err);
            }
        };

        let mut report = ReconcileReport::default();
        for path in &scan.strays {
            remove_quietly(path);
            report.orphans_removed.push(path.clone());
        }

        let mut restored: Vec<(Arc<FileRecord>, FileMetadata)> = Vec::new();
        for (uuid, data_path) in &scan.data {
            if let Some(record) = held.remove(uuid) {
                if let Ok(meta) = record.metadata() {
                    restored.push((record, meta));
                    continue;
                }
            }

            let record = FileRecord::new(
                data_path.clone(),
                layout.meta_path(uuid),
                layout.preview_path(uuid),
            );

            match check_candidate(&record, uuid, scan.meta.contains_key(uuid)) {
                Ok(meta) => restored.push((Arc::new(record), meta)),
                Err(reason) => {
                    warn!(%uuid, %reason, "discarding staged file");
                    record.delete_from_disk();
                    report.discarded.push(DiscardedFile {
                        uuid: *uuid,
                        reason,
                    });
                }
            }
        }

        for (uuid, path) in scan.meta.iter().chain(scan.previews.iter()) {
            if !scan.data.contains_key(uuid) {
                warn!(path = %path.display(), "removing file without staged data");
                remove_quietly(path);
                report.orphans_removed.push(path.clone());
            }
        }

        restored.sort_by(|(_, a), (_, b)| (a.added_on, a.uuid).cmp(&(b.added_on, b.uuid)));
        report.restored = restored.iter().map(|(_, meta)| meta.uuid).collect();
        *records = restored.into_iter().map(|(record, _)| record).collect();
        self.ensure_invariants(records);

        info!(
            restored = report.restored.len(),
            discarded = report.discarded.len(),
            orphans = report.orphans_removed.len(),
            "reconciled staging area"
        );
        self.events.publish(report.restored.clone());
        Ok(report)
    }
}

fn scan(layout: &StageLayout) -> Result<Scan> {
    let mut scan = Scan::default();
    let dirs = [
        (layout.files_dir(), FileKind::Data),
        (layout.meta_dir(), FileKind::Meta),
        (layout.previews_dir(), FileKind::Preview),
    ];

    for (dir, kind) in dirs {
        for path in list_files(dir)? {
            let uuid = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| uuid_from_file_name(kind, name));

            let Some(uuid) = uuid else {
                scan.strays.push(path);
                continue;
            };
            let bucket = match kind {
                FileKind::Data => &mut scan.data,
                FileKind::Meta => &mut scan.meta,
                FileKind::Preview => &mut scan.previews,
            };
            bucket.insert(uuid, path);
        }
    }
    Ok(scan)
}

fn check_candidate(
    record: &FileRecord,
    uuid: &Uuid,
    has_meta: bool,
) -> std::result::Result<FileMetadata, String> {
    if !has_meta {
        return Err("metadata file is missing".into());
    }
    let meta = record.metadata().map_err(|err| err.to_string())?;
    if meta.uuid != *uuid {
        return Err(format!("metadata belongs to {}", meta.uuid));
    }
    if meta.is_taken() {
        return Err("left taken by a previous run".into());
    }
    Ok(meta)
}

fn wipe(layout: &StageLayout) {
    for dir in [layout.files_dir(), layout.meta_dir(), layout.previews_dir()] {
        wipe_dir(dir);
    }
}

fn wipe_dir(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            remove_quietly(&path);
        }
    }
}
