//! # Attachment Snapshots
//!
//! [`Enumerator`] turns the store's current content into an immutable,
//! UI-facing [`AttachmentSnapshot`] for one submission target. It never mutates
//! the store.
//!
//! Building a snapshot has two phases:
//!
//! 1. Under the store lock, copy what is needed from every free file (taken
//!    files are skipped entirely) and count selected files.
//! 2. With the lock released, stat and probe the visible files, then compute the
//!    per-file violations against the board's [`PostingLimits`]. The total size
//!    limit applies to the visible files together, selected or not.
//!
//! Only the first `max_visible` free files are described individually. When there
//! are more, one [`Attachable::Overflow`] entry carrying the total count is
//! appended instead, so the cost of a snapshot does not grow with the store.
//!
//! Phase 2 checks a [`CancelFlag`] before each file and bails out with
//! [`StageError::Cancelled`].

use crate::error::{Result, StageError};
use crate::model::{BoardKey, SubmissionTarget};
use crate::probe::{ExifFinding, MediaProbe};
use crate::store::record::FileRecord;
use crate::store::AttachmentStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_VISIBLE_ATTACHABLES: usize = 32;

/// Per-board posting limits. `None` means unknown or unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingLimits {
    pub max_files_per_post: Option<usize>,
    pub max_total_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub max_video_size: Option<u64>,
    pub spoilers: bool,
}

/// Supplies [`PostingLimits`] for a board. Unknown boards get the default,
/// which imposes nothing and disallows spoilers.
pub trait LimitsProvider: Send + Sync {
    fn limits_for(&self, board: &BoardKey) -> PostingLimits;
}

/// A fixed set of limits with optional per-board overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticLimits {
    fallback: PostingLimits,
    boards: HashMap<BoardKey, PostingLimits>,
}

impl StaticLimits {
    pub fn new(fallback: PostingLimits) -> Self {
        Self {
            fallback,
            boards: HashMap::new(),
        }
    }

    pub fn with_board(mut self, board: BoardKey, limits: PostingLimits) -> Self {
        self.boards.insert(board, limits);
        self
    }
}

impl LimitsProvider for StaticLimits {
    fn limits_for(&self, board: &BoardKey) -> PostingLimits {
        self.boards
            .get(board)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Cooperative cancellation shared between the caller and a running enumeration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSnapshot {
    /// `0` when the board's limit is unknown.
    pub max_allowed_attachables_per_post: usize,
    pub attachables: Vec<Attachable>,
}

impl AttachmentSnapshot {
    pub fn files(&self) -> impl Iterator<Item = &FileAttachable> {
        self.attachables.iter().filter_map(|a| match a {
            Attachable::File(file) => Some(file),
            Attachable::Overflow { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Attachable {
    File(FileAttachable),
    /// Stands in for every file past the visible cap.
    Overflow { total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachable {
    pub uuid: Uuid,
    pub file_name: String,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoiler_info: Option<SpoilerInfo>,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_dimensions: Option<ImageDimensions>,
    pub exif: BTreeSet<ExifFinding>,
    pub violations: Violations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoilerInfo {
    pub marked_as_spoiler: bool,
    pub board_supports_spoilers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violations {
    pub file_max_size_exceeded: bool,
    pub total_file_size_exceeded: bool,
    pub max_attached_files_count_exceeded: bool,
    pub marked_as_spoiler_on_non_spoiler_board: bool,
}

impl Violations {
    pub fn any(&self) -> bool {
        self.file_max_size_exceeded
            || self.total_file_size_exceeded
            || self.max_attached_files_count_exceeded
            || self.marked_as_spoiler_on_non_spoiler_board
    }
}

struct Candidate {
    record: Arc<FileRecord>,
    uuid: Uuid,
    file_name: String,
    original_file_name: String,
    selected: bool,
    spoiler: bool,
}

#[derive(Default)]
struct Collected {
    visible: Vec<Candidate>,
    selected: usize,
    total: usize,
}

pub struct Enumerator {
    store: Arc<AttachmentStore>,
    limits: Arc<dyn LimitsProvider>,
    probe: Arc<dyn MediaProbe>,
    max_visible: usize,
}

impl Enumerator {
    pub fn new(
        store: Arc<AttachmentStore>,
        limits: Arc<dyn LimitsProvider>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            store,
            limits,
            probe,
            max_visible: DEFAULT_MAX_VISIBLE_ATTACHABLES,
        }
    }

    pub fn with_max_visible(mut self, max_visible: usize) -> Self {
        self.max_visible = max_visible;
        self
    }

    pub fn enumerate(
        &self,
        target: &SubmissionTarget,
        cancel: &CancelFlag,
    ) -> Result<AttachmentSnapshot> {
        if !target.is_well_formed() {
            return Err(StageError::Validation(format!(
                "cannot enumerate for malformed target '{}'",
                target
            )));
        }

        let limits = self.limits.limits_for(&target.board_key());
        let collected = self.collect();
        let selected_count = collected.selected;

        let sizes: Vec<u64> = collected.visible.iter().map(file_size_of).collect();
        let total_size: u64 = sizes.iter().sum();
        let total_exceeded = matches!(limits.max_total_size, Some(max) if max > 0 && total_size > max);

        let mut attachables = Vec::with_capacity(collected.visible.len() + 1);
        for (candidate, &file_size) in collected.visible.iter().zip(&sizes) {
            if cancel.is_cancelled() {
                debug!(%target, "enumeration cancelled");
                return Err(StageError::Cancelled);
            }
            let file = self.describe(
                candidate,
                file_size,
                &limits,
                selected_count,
                total_exceeded,
            );
            attachables.push(Attachable::File(file));
        }

        if collected.total > self.max_visible {
            attachables.push(Attachable::Overflow {
                total: collected.total,
            });
        }

        debug!(
            %target,
            total = collected.total,
            selected = selected_count,
            total_size,
            "built attachment snapshot"
        );
        Ok(AttachmentSnapshot {
            max_allowed_attachables_per_post: limits.max_files_per_post.unwrap_or(0),
            attachables,
        })
    }

    /// Copies what the snapshot needs while holding the store lock.
    fn collect(&self) -> Collected {
        let mut collected = Collected::default();
        let max_visible = self.max_visible;

        self.store.map_ordered(|_, record, meta| {
            if meta.is_taken() {
                return None::<()>;
            }
            collected.total += 1;
            if meta.selected {
                collected.selected += 1;
            }
            if collected.total <= max_visible {
                collected.visible.push(Candidate {
                    record: Arc::clone(record),
                    uuid: meta.uuid,
                    file_name: meta.file_name.clone(),
                    original_file_name: meta.original_file_name.clone(),
                    selected: meta.selected,
                    spoiler: meta.spoiler,
                });
            }
            None
        });
        collected
    }

    fn describe(
        &self,
        candidate: &Candidate,
        file_size: u64,
        limits: &PostingLimits,
        selected_count: usize,
        total_exceeded: bool,
    ) -> FileAttachable {
        let path = candidate.record.data_path();
        let is_video = self
            .probe
            .is_probably_video(&candidate.original_file_name, path);
        let size_limit = if is_video {
            limits.max_video_size
        } else {
            limits.max_file_size
        };
        let file_max_size_exceeded = matches!(size_limit, Some(max) if max > 0 && file_size > max);

        let max_attached_files_count_exceeded = match limits.max_files_per_post {
            None => false,
            Some(max) if selected_count < max => false,
            Some(max) if selected_count == max => !candidate.selected,
            Some(_) => true,
        };

        let spoiler_info = if !limits.spoilers && !candidate.spoiler {
            None
        } else {
            Some(SpoilerInfo {
                marked_as_spoiler: candidate.spoiler,
                board_supports_spoilers: limits.spoilers,
            })
        };

        FileAttachable {
            uuid: candidate.uuid,
            file_name: candidate.file_name.clone(),
            selected: candidate.selected,
            spoiler_info,
            file_size,
            image_dimensions: self
                .probe
                .dimensions(path)
                .map(|(width, height)| ImageDimensions { width, height }),
            exif: self.probe.exif_findings(path),
            violations: Violations {
                file_max_size_exceeded,
                total_file_size_exceeded: total_exceeded,
                max_attached_files_count_exceeded,
                marked_as_spoiler_on_non_spoiler_board: candidate.selected
                    && candidate.spoiler
                    && !limits.spoilers,
            },
        }
    }
}

fn file_size_of(candidate: &Candidate) -> u64 {
    candidate.record.data_size().unwrap_or_else(|err| {
        warn!(uuid = %candidate.uuid, error = %err, "cannot stat staged file");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use std::path::Path;

    /// Treats names ending in `.webm` as video and reports fixed dimensions for `.png`.
    struct FakeProbe;

    impl MediaProbe for FakeProbe {
        fn dimensions(&self, _path: &Path) -> Option<(u32, u32)> {
            Some((640, 480))
        }

        fn exif_findings(&self, _path: &Path) -> BTreeSet<ExifFinding> {
            BTreeSet::new()
        }

        fn is_probably_video(&self, original_name: &str, _path: &Path) -> bool {
            original_name.ends_with(".webm")
        }
    }

    fn target() -> SubmissionTarget {
        SubmissionTarget::thread("4chan", "g", 1)
    }

    fn enumerator(env: &TestEnv, limits: PostingLimits) -> Enumerator {
        Enumerator::new(
            Arc::clone(&env.store),
            Arc::new(StaticLimits::new(limits)),
            Arc::new(FakeProbe),
        )
    }

    fn snapshot(env: &TestEnv, limits: PostingLimits) -> AttachmentSnapshot {
        enumerator(env, limits)
            .enumerate(&target(), &CancelFlag::new())
            .unwrap()
    }

    fn file<'a>(snapshot: &'a AttachmentSnapshot, uuid: &Uuid) -> &'a FileAttachable {
        snapshot.files().find(|f| f.uuid == *uuid).unwrap()
    }

    #[test]
    fn lists_free_files_in_order_with_details() {
        let env = TestEnv::new();
        let a = env.add("a.png", 100, true);
        let b = env.add("b.png", 200, false);

        let snap = snapshot(&env, PostingLimits::default());

        let ids: Vec<Uuid> = snap.files().map(|f| f.uuid).collect();
        assert_eq!(ids, vec![a, b]);
        let first = file(&snap, &a);
        assert_eq!(first.file_name, "a.png");
        assert!(first.selected);
        assert_eq!(first.file_size, "a.png".len() as u64);
        assert_eq!(
            first.image_dimensions,
            Some(ImageDimensions {
                width: 640,
                height: 480
            })
        );
        assert!(!first.violations.any());
        assert_eq!(snap.max_allowed_attachables_per_post, 0);
    }

    #[test]
    fn taken_files_are_skipped() {
        let env = TestEnv::new();
        env.add("a.png", 100, true);
        let free = env.add("b.png", 200, false);
        env.store.take_selected_files(&target());

        let snap = snapshot(&env, PostingLimits::default());
        let ids: Vec<Uuid> = snap.files().map(|f| f.uuid).collect();
        assert_eq!(ids, vec![free]);
    }

    #[test]
    fn overflow_collapses_into_one_entry() {
        let env = TestEnv::new();
        for i in 0..5 {
            env.add(&format!("{i}.png"), 100 + i, false);
        }

        let snap = enumerator(&env, PostingLimits::default())
            .with_max_visible(3)
            .enumerate(&target(), &CancelFlag::new())
            .unwrap();

        assert_eq!(snap.files().count(), 3);
        assert_eq!(snap.attachables.last(), Some(&Attachable::Overflow { total: 5 }));
    }

    #[test]
    fn exactly_max_visible_has_no_overflow() {
        let env = TestEnv::new();
        for i in 0..3 {
            env.add(&format!("{i}.png"), 100 + i, false);
        }
        let snap = enumerator(&env, PostingLimits::default())
            .with_max_visible(3)
            .enumerate(&target(), &CancelFlag::new())
            .unwrap();
        assert_eq!(snap.attachables.len(), 3);
    }

    #[test]
    fn max_files_flags_follow_selection_count() {
        let limits = PostingLimits {
            max_files_per_post: Some(2),
            ..PostingLimits::default()
        };

        // Below the limit: nothing flagged.
        let env = TestEnv::new();
        let a = env.add("a.png", 100, true);
        let b = env.add("b.png", 200, false);
        let snap = snapshot(&env, limits.clone());
        assert!(!file(&snap, &a).violations.max_attached_files_count_exceeded);
        assert!(!file(&snap, &b).violations.max_attached_files_count_exceeded);

        // At the limit: only unselected files are flagged.
        let c = env.add("c.png", 300, true);
        let snap = snapshot(&env, limits.clone());
        assert!(!file(&snap, &a).violations.max_attached_files_count_exceeded);
        assert!(file(&snap, &b).violations.max_attached_files_count_exceeded);
        assert!(!file(&snap, &c).violations.max_attached_files_count_exceeded);
        assert_eq!(snap.max_allowed_attachables_per_post, 2);

        // Above the limit: everything is flagged.
        env.store.update_selection(&b, true).unwrap();
        let snap = snapshot(&env, limits);
        assert!(snap
            .files()
            .all(|f| f.violations.max_attached_files_count_exceeded));
    }

    #[test]
    fn file_size_limit_depends_on_video_classification() {
        let env = TestEnv::new();
        let image = env.add("big.png", 100, false);
        let video = env.add("big.webm", 200, false);

        let limits = PostingLimits {
            max_file_size: Some(4),
            max_video_size: Some(100),
            ..PostingLimits::default()
        };
        let snap = snapshot(&env, limits);
        assert!(file(&snap, &image).violations.file_max_size_exceeded);
        assert!(!file(&snap, &video).violations.file_max_size_exceeded);

        // Without a video limit videos are never flagged.
        let limits = PostingLimits {
            max_file_size: Some(4),
            ..PostingLimits::default()
        };
        let snap = snapshot(&env, limits);
        assert!(!file(&snap, &video).violations.file_max_size_exceeded);
    }

    #[test]
    fn total_size_counts_every_visible_file() {
        let env = TestEnv::new();
        // Each name doubles as the file's bytes: 8 bytes apiece.
        let a = env.add("aaaa.png", 100, true);
        let limits = PostingLimits {
            max_total_size: Some(10),
            ..PostingLimits::default()
        };

        let snap = snapshot(&env, limits.clone());
        assert!(snap.files().all(|f| !f.violations.total_file_size_exceeded));

        // Unselected files still count.
        let b = env.add("bbbb.png", 200, false);
        let snap = snapshot(&env, limits.clone());
        assert!(file(&snap, &a).violations.total_file_size_exceeded);
        assert!(file(&snap, &b).violations.total_file_size_exceeded);

        // Taken files do not.
        env.store
            .take_selected_files(&SubmissionTarget::catalog("4chan", "g"));
        let snap = snapshot(&env, limits);
        assert!(!file(&snap, &b).violations.total_file_size_exceeded);
    }

    #[test]
    fn spoiler_info_and_flag() {
        let env = TestEnv::new();
        let plain = env.add("plain.png", 100, true);
        let spoilered = env.add("spoiler.png", 200, true);
        env.store.update_spoiler(&spoilered, true).unwrap();

        let snap = snapshot(&env, PostingLimits::default());
        assert_eq!(file(&snap, &plain).spoiler_info, None);
        let info = file(&snap, &spoilered).spoiler_info.unwrap();
        assert!(info.marked_as_spoiler);
        assert!(!info.board_supports_spoilers);
        assert!(
            file(&snap, &spoilered)
                .violations
                .marked_as_spoiler_on_non_spoiler_board
        );

        let limits = PostingLimits {
            spoilers: true,
            ..PostingLimits::default()
        };
        let snap = snapshot(&env, limits);
        assert!(file(&snap, &plain).spoiler_info.is_some());
        assert!(!file(&snap, &spoilered).violations.any());
    }

    #[test]
    fn unselected_spoiler_is_not_flagged() {
        let env = TestEnv::new();
        let id = env.add("a.png", 100, false);
        env.store.update_spoiler(&id, true).unwrap();

        let snap = snapshot(&env, PostingLimits::default());
        assert!(!file(&snap, &id).violations.marked_as_spoiler_on_non_spoiler_board);
    }

    #[test]
    fn per_board_limits_override_the_fallback() {
        let limits = StaticLimits::new(PostingLimits::default()).with_board(
            BoardKey::new("4chan", "g"),
            PostingLimits {
                spoilers: true,
                ..PostingLimits::default()
            },
        );
        assert!(limits.limits_for(&BoardKey::new("4chan", "g")).spoilers);
        assert!(!limits.limits_for(&BoardKey::new("4chan", "b")).spoilers);
    }

    #[test]
    fn cancelled_enumeration_fails() {
        let env = TestEnv::new();
        env.add("a.png", 100, false);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = enumerator(&env, PostingLimits::default()).enumerate(&target(), &cancel);
        assert!(matches!(result, Err(StageError::Cancelled)));
    }

    #[test]
    fn malformed_target_is_rejected() {
        let env = TestEnv::new();
        let bad = SubmissionTarget::catalog("", "g");
        let result = enumerator(&env, PostingLimits::default()).enumerate(&bad, &CancelFlag::new());
        assert!(matches!(result, Err(StageError::Validation(_))));
    }

    #[test]
    fn enumeration_does_not_mutate_the_store() {
        let env = TestEnv::new();
        env.add("a.png", 100, true);
        let before = env.store.generation();

        snapshot(&env, PostingLimits::default());
        assert_eq!(env.store.generation(), before);
        assert_eq!(env.store.selected_files_count(), 1);
    }
}
