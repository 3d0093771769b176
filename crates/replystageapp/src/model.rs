//! # Domain Model: Staged File Metadata
//!
//! Every staged attachment is described by a [`FileMetadata`] record persisted as a
//! small JSON document next to the file's bytes. The record is versioned: a record
//! written by an incompatible schema is never partially trusted, it is discarded.
//!
//! ## On-Disk Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "uuid": "5b0e…",
//!   "fileName": "cat.jpg",
//!   "originalFileName": "IMG_0042.jpg",
//!   "spoiler": false,
//!   "selected": true,
//!   "addedOn": 1760000000000,
//!   "takenBy": { "isThreadTarget": true, "site": "4chan", "board": "g", "threadNumber": 123 }
//! }
//! ```
//!
//! `takenBy` is omitted while the file is free. When present it names the
//! submission target that currently owns the file.
//!
//! ## Validity
//!
//! [`FileMetadata::is_valid`] is the single gate used before trusting a record:
//!
//! - `version` equals [`META_VERSION`]
//! - `uuid` is not nil, `addedOn` is positive, both names are non-blank
//! - `takenBy` is absent or [`SubmissionTarget::is_well_formed`]
//!
//! Missing required fields are a deserialization error, which the record layer
//! reports as corrupt metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use uuid::Uuid;

/// Current metadata schema version. Records carrying any other version are invalid.
pub const META_VERSION: u32 = 1;

/// Returns the trimmed name if it is exactly one plain path component.
///
/// Display names end up joined onto destination directories, so separators,
/// `..` and absolute paths are refused.
pub fn plain_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part.to_str() == Some(name) => Some(name),
        _ => None,
    }
}

/// A site + board pair, the granularity at which posting limits apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardKey {
    pub site: String,
    pub board: String,
}

impl BoardKey {
    pub fn new(site: impl Into<String>, board: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            board: board.into(),
        }
    }
}

impl fmt::Display for BoardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.board)
    }
}

/// Where a submission is headed: a new thread on a board, or a reply to a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionTarget {
    pub is_thread_target: bool,
    pub site: String,
    pub board: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_number: Option<u64>,
}

impl SubmissionTarget {
    /// A reply to an existing thread.
    pub fn thread(site: impl Into<String>, board: impl Into<String>, thread_number: u64) -> Self {
        Self {
            is_thread_target: true,
            site: site.into(),
            board: board.into(),
            thread_number: Some(thread_number),
        }
    }

    /// A new thread on a board.
    pub fn catalog(site: impl Into<String>, board: impl Into<String>) -> Self {
        Self {
            is_thread_target: false,
            site: site.into(),
            board: board.into(),
            thread_number: None,
        }
    }

    pub fn board_key(&self) -> BoardKey {
        BoardKey::new(self.site.clone(), self.board.clone())
    }

    pub fn is_well_formed(&self) -> bool {
        if self.site.trim().is_empty() || self.board.trim().is_empty() {
            return false;
        }

        match (self.is_thread_target, self.thread_number) {
            (true, Some(no)) => no > 0,
            (false, None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_number {
            Some(no) if self.is_thread_target => {
                write!(f, "{}/{}/{}", self.site, self.board, no)
            }
            _ => write!(f, "{}/{}", self.site, self.board),
        }
    }
}

/// Parses `site/board` (new thread) or `site/board/thread` (reply).
impl FromStr for SubmissionTarget {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.trim().split('/').map(str::trim).collect();
        let target = match parts.as_slice() {
            [site, board] => SubmissionTarget::catalog(*site, *board),
            [site, board, thread] => {
                let no = thread
                    .parse::<u64>()
                    .map_err(|_| format!("'{}' is not a thread number", thread))?;
                SubmissionTarget::thread(*site, *board, no)
            }
            _ => {
                return Err(format!(
                    "'{}' is not a target, expected site/board or site/board/thread",
                    input
                ))
            }
        };

        if !target.is_well_formed() {
            return Err(format!("'{}' is not a valid target", input));
        }
        Ok(target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub version: u32,
    pub uuid: Uuid,
    pub file_name: String,
    pub original_file_name: String,
    pub spoiler: bool,
    pub selected: bool,
    pub added_on: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_by: Option<SubmissionTarget>,
}

// Every field is optional at the parsing stage so that a record with a missing
// field surfaces as one precise error instead of a generic serde message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadataHelper {
    version: Option<u32>,
    uuid: Option<Uuid>,
    file_name: Option<String>,
    original_file_name: Option<String>,
    spoiler: Option<bool>,
    selected: Option<bool>,
    added_on: Option<i64>,
    #[serde(default)]
    taken_by: Option<SubmissionTarget>,
}

impl<'de> Deserialize<'de> for FileMetadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let helper = FileMetadataHelper::deserialize(deserializer)?;

        Ok(FileMetadata {
            version: helper.version.ok_or_else(|| D::Error::missing_field("version"))?,
            uuid: helper.uuid.ok_or_else(|| D::Error::missing_field("uuid"))?,
            file_name: helper
                .file_name
                .ok_or_else(|| D::Error::missing_field("fileName"))?,
            original_file_name: helper
                .original_file_name
                .ok_or_else(|| D::Error::missing_field("originalFileName"))?,
            spoiler: helper.spoiler.ok_or_else(|| D::Error::missing_field("spoiler"))?,
            selected: helper
                .selected
                .ok_or_else(|| D::Error::missing_field("selected"))?,
            added_on: helper
                .added_on
                .ok_or_else(|| D::Error::missing_field("addedOn"))?,
            taken_by: helper.taken_by,
        })
    }
}

impl FileMetadata {
    /// A fresh, free, unselected record at the current schema version.
    pub fn new(uuid: Uuid, original_file_name: impl Into<String>, added_on: i64) -> Self {
        let original_file_name = original_file_name.into();
        Self {
            version: META_VERSION,
            uuid,
            file_name: original_file_name.clone(),
            original_file_name,
            spoiler: false,
            selected: false,
            added_on,
            taken_by: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        if self.version != META_VERSION {
            return false;
        }

        if self.uuid.is_nil() || self.added_on <= 0 {
            return false;
        }

        if self.file_name.trim().is_empty() || self.original_file_name.trim().is_empty() {
            return false;
        }

        self.taken_by
            .as_ref()
            .map_or(true, SubmissionTarget::is_well_formed)
    }

    pub fn is_taken(&self) -> bool {
        self.taken_by.is_some()
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
