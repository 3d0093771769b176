//! # Storage Layer
//!
//! [`AttachmentStore`] is the single authoritative index of staged files. It is
//! built once per process, reconciled against disk at cold start (see
//! [`reconcile`]), and then shared by reference with every compose session and
//! with the submission pipeline.
//!
//! ## One Lock
//!
//! Every public operation runs under one mutex held for the whole call. The file
//! count is small and each operation is short, while several operations must be
//! atomic across records: "take every selected file" cannot interleave with a
//! concurrent add or delete. Callers observe a total order equal to lock
//! acquisition order.
//!
//! ## Invariants
//!
//! After every public operation:
//! 1. No two records share a uuid.
//! 2. Records are sorted ascending by `added_on`.
//! 3. A record whose `taken_by` is set is invisible to selection, count and
//!    toggle queries.
//!
//! A broken order or a duplicate is a programming defect: it panics in debug
//! builds and is logged and repaired in release builds.
//!
//! ## Hand-off Lifecycle
//!
//! ```text
//!   add_new_file ──► free ──take_selected_files──► taken ──delete_files──► gone
//!                     ▲                              │
//!                     └──────── put_files_back ◄─────┘
//! ```
//!
//! Taking is a compare-and-set on the record's owner field performed under the
//! store lock, so two concurrent takes can never both receive the same file.
//!
//! ## Failure Policy
//!
//! Expected failures (unknown uuid, already taken, rejected import) come back as
//! `false`, `0` or an empty list. A record whose metadata can no longer be read is
//! evicted from memory and deleted from disk on the next pass over the index; one
//! whose metadata cannot be written is evicted the same way right away. Bulk
//! operations log per-record errors and keep going.
//!
//! ## Change Notification
//!
//! Mutations that change observable state publish a [`ChangeNotice`] through a
//! single-slot watch channel; see [`AttachmentStore::subscribe`].

use crate::error::{Result, StageError};
use crate::model::{FileMetadata, SubmissionTarget};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod events;
pub mod layout;
pub mod reconcile;
pub mod record;

pub use events::ChangeNotice;
pub use layout::StageLayout;
pub use reconcile::ReconcileReport;
pub use record::FileRecord;

use layout::{file_name, FileKind};

type Entry = (Arc<FileRecord>, FileMetadata);

#[derive(Debug)]
pub struct AttachmentStore {
    records: Mutex<Vec<Arc<FileRecord>>>,
    events: events::StoreEvents,
}

impl Default for AttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentStore {
    /// An empty store. Call [`reconcile_from_disk`](Self::reconcile_from_disk)
    /// once at cold start to load what previous runs left behind.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            events: events::StoreEvents::new(),
        }
    }

    /// Receives the most recent [`ChangeNotice`]; intermediate notices are dropped.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ChangeNotice> {
        self.events.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Validates `record` and inserts it in `added_on` order.
    ///
    /// Rejected (returns `false`, store untouched) when either file is missing or
    /// unreadable, the names do not match the uuid, the metadata is invalid or
    /// taken, or the uuid is already present.
    pub fn add_new_file(&self, record: FileRecord) -> bool {
        let mut records = self.records.lock();

        let meta = match validate_new(&record) {
            Ok(meta) => meta,
            Err(reason) => {
                warn!(path = %record.data_path().display(), %reason, "rejected new staged file");
                return false;
            }
        };

        let entries = self.load_entries(&mut records);
        if entries.iter().any(|(_, existing)| existing.uuid == meta.uuid) {
            warn!(uuid = %meta.uuid, "rejected new staged file: uuid already present");
            return false;
        }

        let position = entries.partition_point(|(_, existing)| existing.added_on <= meta.added_on);
        records.insert(position, Arc::new(record));
        self.ensure_invariants(&mut records);

        debug!(uuid = %meta.uuid, position, "added staged file");
        self.events.publish(vec![meta.uuid]);
        true
    }

    /// Atomically claims every free, selected file for `target`.
    ///
    /// The returned records have left the stageable pool. Hand them back with
    /// [`put_files_back`](Self::put_files_back) or remove them with
    /// [`delete_files`](Self::delete_files).
    pub fn take_selected_files(&self, target: &SubmissionTarget) -> Vec<Arc<FileRecord>> {
        if !target.is_well_formed() {
            warn!(%target, "refusing to take files for a malformed target");
            return Vec::new();
        }

        let mut records = self.records.lock();
        let mut taken = Vec::new();
        let mut uuids = Vec::new();
        let mut failed = Vec::new();

        for (record, meta) in self.load_entries(&mut records) {
            if !meta.selected || meta.is_taken() {
                continue;
            }

            match record.mark_taken(target) {
                Ok(true) => {
                    uuids.push(meta.uuid);
                    taken.push(record);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(uuid = %meta.uuid, %target, error = %err, "failed to take staged file");
                    uuids.push(meta.uuid);
                    failed.push(record);
                }
            }
        }

        self.evict(&mut records, &failed);
        if !uuids.is_empty() {
            info!(%target, count = taken.len(), "took staged files");
            self.events.publish(uuids);
        }
        taken
    }

    /// Returns taken records to the pool. Returns `false` if any could not be
    /// restored; those are evicted and the rest are still processed.
    ///
    /// Records no longer in the store (deleted meanwhile) are skipped.
    pub fn put_files_back(&self, to_restore: &[Arc<FileRecord>]) -> bool {
        let mut records = self.records.lock();
        let mut all_restored = true;
        let mut uuids = Vec::new();
        let mut failed = Vec::new();

        for record in to_restore {
            if !records.iter().any(|held| Arc::ptr_eq(held, record)) {
                debug!(path = %record.data_path().display(), "skipping put back of a record no longer staged");
                continue;
            }

            match record.mark_untaken() {
                Ok(()) => {
                    if let Ok(uuid) = record.uuid() {
                        uuids.push(uuid);
                    }
                }
                Err(err) => {
                    error!(path = %record.data_path().display(), error = %err, "failed to put file back");
                    all_restored = false;
                    uuids.extend(record.uuid().ok());
                    failed.push(Arc::clone(record));
                }
            }
        }

        self.evict(&mut records, &failed);
        if !uuids.is_empty() {
            self.events.publish(uuids);
        }
        all_restored
    }

    /// Puts back every record that has been taken for at least `ttl`.
    ///
    /// Guards against a submission that died without releasing its files.
    pub fn reclaim_stale_taken(&self, ttl: Duration) -> Vec<Uuid> {
        let mut records = self.records.lock();
        let mut reclaimed = Vec::new();
        let mut failed = Vec::new();

        for (record, meta) in self.load_entries(&mut records) {
            let Some(age) = record.taken_for() else {
                continue;
            };
            if !meta.is_taken() || age < ttl {
                continue;
            }

            match record.mark_untaken() {
                Ok(()) => {
                    warn!(uuid = %meta.uuid, age_secs = age.as_secs(), "reclaimed stale taken file");
                    reclaimed.push(meta.uuid);
                }
                Err(err) => {
                    error!(uuid = %meta.uuid, error = %err, "failed to reclaim stale taken file");
                    failed.push(record);
                }
            }
        }

        self.evict(&mut records, &failed);
        if !reclaimed.is_empty() || !failed.is_empty() {
            self.events.publish(reclaimed.clone());
        }
        reclaimed
    }

    // --- Deletion ---

    /// Deletes one file. Unknown uuids are a no-op; returns how many were removed.
    pub fn delete_file(&self, uuid: &Uuid) -> usize {
        self.delete_files(std::slice::from_ref(uuid))
    }

    /// Deletes the given files, taken or not, from memory and disk.
    pub fn delete_files(&self, uuids: &[Uuid]) -> usize {
        if uuids.is_empty() {
            return 0;
        }
        let mut records = self.records.lock();
        self.remove_where(&mut records, |meta| uuids.contains(&meta.uuid))
    }

    /// Deletes every free, selected file.
    pub fn delete_selected_files(&self) -> usize {
        let mut records = self.records.lock();
        self.remove_where(&mut records, |meta| meta.selected && !meta.is_taken())
    }

    /// Deletes everything, including taken files.
    pub fn delete_all_files(&self) -> usize {
        let mut records = self.records.lock();
        self.remove_where(&mut records, |_| true)
    }

    fn remove_where<F>(&self, records: &mut Vec<Arc<FileRecord>>, matches: F) -> usize
    where
        F: Fn(&FileMetadata) -> bool,
    {
        let entries = self.load_entries(records);
        let mut kept = Vec::with_capacity(entries.len());
        let mut removed = Vec::new();

        for (record, meta) in entries {
            if matches(&meta) {
                record.delete_from_disk();
                removed.push(meta.uuid);
            } else {
                kept.push(record);
            }
        }

        *records = kept;
        let count = removed.len();
        if count > 0 {
            debug!(count, "deleted staged files");
            self.events.publish(removed);
        }
        count
    }

    // --- Per-file updates ---

    /// Returns `Ok(false)` when the file is unknown or currently taken. A file
    /// whose metadata cannot be written is evicted and the I/O error returned.
    pub fn update_selection(&self, uuid: &Uuid, selected: bool) -> Result<bool> {
        self.update_free(uuid, |record, meta| {
            record.update_selection(selected)?;
            Ok(meta.selected != selected)
        })
    }

    pub fn update_spoiler(&self, uuid: &Uuid, spoiler: bool) -> Result<bool> {
        self.update_free(uuid, |record, meta| {
            record.update_spoiler(spoiler)?;
            Ok(meta.spoiler != spoiler)
        })
    }

    pub fn update_name(&self, uuid: &Uuid, name: &str) -> Result<bool> {
        self.update_free(uuid, |record, meta| {
            record.update_name(name)?;
            Ok(meta.file_name != name.trim())
        })
    }

    fn update_free<F>(&self, uuid: &Uuid, apply: F) -> Result<bool>
    where
        F: FnOnce(&FileRecord, &FileMetadata) -> Result<bool>,
    {
        let mut records = self.records.lock();
        let found = self
            .load_entries(&mut records)
            .into_iter()
            .find(|(_, meta)| meta.uuid == *uuid);

        let Some((record, meta)) = found else {
            return Ok(false);
        };
        if meta.is_taken() {
            return Ok(false);
        }

        match apply(&record, &meta) {
            Ok(changed) => {
                if changed {
                    self.events.publish(vec![meta.uuid]);
                }
                Ok(true)
            }
            Err(err @ StageError::Io(_)) => {
                self.evict(&mut records, &[record]);
                self.events.publish(vec![meta.uuid]);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Replaces the preview image of a staged file.
    pub fn update_preview(&self, uuid: &Uuid, bytes: &[u8]) -> Result<bool> {
        let mut records = self.records.lock();
        let Some((record, meta)) = self
            .load_entries(&mut records)
            .into_iter()
            .find(|(_, meta)| meta.uuid == *uuid)
        else {
            return Ok(false);
        };

        record.write_preview(bytes)?;
        self.events.publish(vec![meta.uuid]);
        Ok(true)
    }

    // --- Queries (taken files are invisible) ---

    pub fn selected_files_count(&self) -> usize {
        self.count_free(|meta| meta.selected)
    }

    pub fn total_files_count(&self) -> usize {
        self.count_free(|_| true)
    }

    pub fn has_selected_files(&self) -> bool {
        self.selected_files_count() > 0
    }

    pub fn is_selected(&self, uuid: &Uuid) -> bool {
        self.count_free(|meta| meta.uuid == *uuid && meta.selected) > 0
    }

    pub fn is_marked_as_spoiler(&self, uuid: &Uuid) -> bool {
        self.count_free(|meta| meta.uuid == *uuid && meta.spoiler) > 0
    }

    fn count_free<F>(&self, matches: F) -> usize
    where
        F: Fn(&FileMetadata) -> bool,
    {
        let mut records = self.records.lock();
        self.load_entries(&mut records)
            .iter()
            .filter(|(_, meta)| !meta.is_taken() && matches(meta))
            .count()
    }

    /// Looks up a record by uuid, taken or not.
    pub fn get(&self, uuid: &Uuid) -> Option<Arc<FileRecord>> {
        let mut records = self.records.lock();
        self.load_entries(&mut records)
            .into_iter()
            .find(|(_, meta)| meta.uuid == *uuid)
            .map(|(record, _)| record)
    }

    /// Maps every record, in order, under the store lock.
    ///
    /// The closure sees the position, the record and its metadata; `None` results
    /// are dropped. Keep the closure free of slow I/O.
    pub fn map_ordered<T, F>(&self, mut mapper: F) -> Vec<T>
    where
        F: FnMut(usize, &Arc<FileRecord>, &FileMetadata) -> Option<T>,
    {
        let mut records = self.records.lock();
        self.ensure_invariants(&mut records);
        self.load_entries(&mut records)
            .iter()
            .enumerate()
            .filter_map(|(index, (record, meta))| mapper(index, record, meta))
            .collect()
    }

    // --- Internals ---

    /// Pairs each record with its metadata, evicting records whose metadata
    /// cannot be read anymore.
    fn load_entries(&self, records: &mut Vec<Arc<FileRecord>>) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(records.len());
        let mut evicted = false;

        records.retain(|record| match record.metadata() {
            Ok(meta) => {
                entries.push((Arc::clone(record), meta));
                true
            }
            Err(err) => {
                error!(path = %record.data_path().display(), error = %err, "evicting unreadable staged file");
                record.delete_from_disk();
                evicted = true;
                false
            }
        });

        if evicted {
            self.events.publish(Vec::new());
        }
        entries
    }

    /// Drops records whose metadata could not be written, from memory and disk.
    fn evict(&self, records: &mut Vec<Arc<FileRecord>>, failed: &[Arc<FileRecord>]) {
        if failed.is_empty() {
            return;
        }
        records.retain(|held| !failed.iter().any(|gone| Arc::ptr_eq(held, gone)));
        for record in failed {
            error!(path = %record.data_path().display(), "evicting staged file after failed metadata write");
            record.delete_from_disk();
        }
    }

    fn ensure_invariants(&self, records: &mut Vec<Arc<FileRecord>>) {
        let entries = self.load_entries(records);
        let violation = find_violation(&entries);
        debug_assert!(violation.is_none(), "{:?}", violation);

        if let Some(err) = violation {
            error!(error = %err, "repairing staged file index");
            let mut entries = entries;
            entries.sort_by_key(|(_, meta)| meta.added_on);
            let mut seen = std::collections::HashSet::new();
            entries.retain(|(_, meta)| seen.insert(meta.uuid));
            *records = entries.into_iter().map(|(record, _)| record).collect();
        }
    }
}

fn find_violation(entries: &[Entry]) -> Option<StageError> {
    let mut seen = std::collections::HashSet::new();
    let mut previous = i64::MIN;

    for (_, meta) in entries {
        if meta.added_on < previous {
            return Some(StageError::InvariantViolation(format!(
                "files not sorted: addedOn {} after {}",
                meta.added_on, previous
            )));
        }
        if !seen.insert(meta.uuid) {
            return Some(StageError::InvariantViolation(format!(
                "duplicate uuid {}",
                meta.uuid
            )));
        }
        previous = meta.added_on;
    }
    None
}

fn validate_new(record: &FileRecord) -> std::result::Result<FileMetadata, String> {
    if !record.data_path().is_file() {
        return Err("data file does not exist".into());
    }
    if !record.meta_path().is_file() {
        return Err("metadata file does not exist".into());
    }
    if !record.files_readable() {
        return Err("data or metadata file cannot be read".into());
    }

    let meta = record.metadata().map_err(|err| err.to_string())?;
    if meta.is_taken() {
        return Err(format!("already taken by {:?}", meta.taken_by));
    }

    let name_of = |path: &std::path::Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default()
    };
    if name_of(record.data_path()) != file_name(FileKind::Data, &meta.uuid) {
        return Err("data file name does not match uuid".into());
    }
    if name_of(record.meta_path()) != file_name(FileKind::Meta, &meta.uuid) {
        return Err("metadata file name does not match uuid".into());
    }

    Ok(meta)
}
