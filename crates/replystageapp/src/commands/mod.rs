//! # Command Layer
//!
//! Each user-facing operation lives in its own submodule as plain functions over
//! an [`AttachmentStore`](crate::store::AttachmentStore). Commands hold the
//! business logic; they never print, parse arguments or pick exit codes.
//!
//! ## Structured Returns
//!
//! Commands return [`CmdResult`], not strings:
//! - `affected_files`: files the command changed, as [`StagedFile`] views
//! - `listed_files`: files to display
//! - `snapshot`: an attachment snapshot, when one was requested
//! - `paths`: files written outside the staging area (e.g. by `submit`)
//! - `messages`: leveled messages for the UI to render
//!
//! ## Selectors
//!
//! Files are addressed by their 1-based position among free files, by full uuid,
//! or by a unique uuid prefix. See [`helpers::FileSelector`].
//!
//! ## Command Modules
//!
//! - [`stage`]: Copy files into the staging area
//! - [`list`]: List staged files and build snapshots
//! - [`update`]: Select, spoiler and rename files
//! - [`submit`]: Hand selected files to a submission and release stale ones
//! - [`delete`]: Remove staged files
//! - [`doctor`]: Reconcile the store with disk
//! - [`helpers`]: Selector parsing and resolution

use crate::enumerate::AttachmentSnapshot;
use crate::model::{FileMetadata, SubmissionTarget};
use crate::store::record::FileRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

pub mod delete;
pub mod doctor;
pub mod helpers;
pub mod list;
pub mod stage;
pub mod submit;
pub mod update;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            content: content.into(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CmdResult {
    pub affected_files: Vec<StagedFile>,
    pub listed_files: Vec<StagedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<AttachmentSnapshot>,
    pub paths: Vec<PathBuf>,
    pub messages: Vec<CmdMessage>,
}

impl CmdResult {
    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_affected_files(mut self, files: Vec<StagedFile>) -> Self {
        self.affected_files = files;
        self
    }

    pub fn with_listed_files(mut self, files: Vec<StagedFile>) -> Self {
        self.listed_files = files;
        self
    }

    pub fn with_snapshot(mut self, snapshot: AttachmentSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == MessageLevel::Error)
    }
}

/// A staged file as presented to a UI.
///
/// `index` is the file's 1-based position among free files; taken files have none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub uuid: Uuid,
    pub file_name: String,
    pub original_file_name: String,
    pub selected: bool,
    pub spoiler: bool,
    pub added_on: DateTime<Utc>,
    pub size: u64,
    pub has_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_by: Option<SubmissionTarget>,
}

impl StagedFile {
    pub fn from_record(index: Option<usize>, record: &FileRecord, meta: &FileMetadata) -> Self {
        Self {
            index,
            uuid: meta.uuid,
            file_name: meta.file_name.clone(),
            original_file_name: meta.original_file_name.clone(),
            selected: meta.selected,
            spoiler: meta.spoiler,
            added_on: DateTime::from_timestamp_millis(meta.added_on).unwrap_or_default(),
            size: record.data_size().unwrap_or(0),
            has_preview: record.has_preview(),
            taken_by: meta.taken_by.clone(),
        }
    }

    pub fn is_taken(&self) -> bool {
        self.taken_by.is_some()
    }
}
