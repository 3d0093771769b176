//! # Replystage
//!
//! A staging store for post attachments. Files the user picks for a post that is
//! not yet submitted are copied into a private staging area, described by small
//! versioned metadata records, and kept until a submission takes them.
//!
//! ## Architecture
//!
//! ```text
//!   UI (CLI, app) ──► api ──► commands ──► store ◄── enumerate ◄── probe
//!                                           ▲
//!                                        import
//! ```
//!
//! - [`store`]: the authoritative, lock-protected index of staged files and the
//!   on-disk layout. Reconciliation at cold start, atomic hand-off to submissions.
//! - [`import`]: writes new files into the staging area.
//! - [`enumerate`]: read-only snapshots for display, with per-board limit checks.
//! - [`probe`]: image dimensions, EXIF findings and video detection.
//! - [`commands`]: UI-agnostic operations returning structured results.
//! - [`api`]: the facade UIs talk to.
//! - [`config`]: layered configuration.
//!
//! ## Lifecycle of a Staged File
//!
//! 1. Imported: data and metadata written, record added to the store.
//! 2. Free: selectable, renamable, spoilerable; visible to every query.
//! 3. Taken: claimed by exactly one submission target; invisible to queries.
//! 4. Gone: deleted after a successful submission, or put back to step 2.

pub mod api;
pub mod commands;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod import;
pub mod model;
pub mod probe;
pub mod store;

#[cfg(test)]
pub mod test_utils;

pub use api::StageApi;
pub use error::{Result, StageError};
