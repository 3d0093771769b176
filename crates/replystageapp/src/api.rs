//! # API Facade
//!
//! [`StageApi`] is the single entry point for UIs. It owns the process's
//! [`AttachmentStore`], wires the importer and the enumerator to it, and
//! dispatches to the command layer.
//!
//! The facade normalizes inputs (selector strings become [`FileSelector`]s,
//! target strings become [`SubmissionTarget`]s) and returns `Result<CmdResult>`.
//! It holds no business logic and does no I/O of its own beyond opening the
//! store.
//!
//! ## Cold Start
//!
//! [`StageApi::open`] creates the staging directories if needed and reconciles
//! the store with disk exactly once. Later repairs (`doctor`) leave files held by
//! an in-flight submission alone.
//!
//! ## Abandoned Takes
//!
//! Files taken for longer than the configured TTL are put back before a snapshot
//! is built and before a new submission takes files, so a submission that died
//! without releasing its files does not hide them forever.

use crate::commands::helpers::{parse_selector, parse_selectors, FileSelector};
use crate::commands::{self, CmdResult};
use crate::config::StageConfig;
use crate::enumerate::Enumerator;
use crate::error::{Result, StageError};
use crate::import::Importer;
use crate::model::SubmissionTarget;
use crate::probe::ImageProbe;
use crate::store::{AttachmentStore, ReconcileReport, StageLayout};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct StageApi {
    store: Arc<AttachmentStore>,
    importer: Importer,
    enumerator: Enumerator,
    config: StageConfig,
}

impl StageApi {
    /// Opens the staging area described by `config`.
    pub fn open(config: StageConfig) -> Result<(Self, ReconcileReport)> {
        let layout = config.layout()?;
        layout.ensure_dirs()?;

        let store = Arc::new(AttachmentStore::new());
        let report = store.reconcile_from_disk(&layout)?;
        debug!(restored = report.restored.len(), "opened staging area");

        let enumerator = Enumerator::new(
            Arc::clone(&store),
            Arc::new(config.limits_provider()),
            Arc::new(ImageProbe),
        )
        .with_max_visible(config.max_visible_attachables);

        let api = Self {
            store,
            importer: Importer::new(layout),
            enumerator,
            config,
        };
        Ok((api, report))
    }

    pub fn store(&self) -> &Arc<AttachmentStore> {
        &self.store
    }

    pub fn layout(&self) -> &StageLayout {
        self.importer.layout()
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn stage_files<P: AsRef<Path>>(&self, sources: &[P], select: bool) -> Result<CmdResult> {
        commands::stage::run(&self.store, &self.importer, sources, select)
    }

    pub fn list_files(&self) -> CmdResult {
        commands::list::run(&self.store)
    }

    /// Lists files along with the attachment snapshot for `target`.
    pub fn check_files(&self, target: &str) -> Result<CmdResult> {
        let target = parse_target(target)?;
        self.store.reclaim_stale_taken(self.config.taken_ttl());
        commands::list::with_snapshot(&self.store, &self.enumerator, &target)
    }

    pub fn select_files<I: AsRef<str>>(&self, ids: &[I], selected: bool) -> Result<CmdResult> {
        let selectors = parse_selectors(ids)?;
        commands::update::select(&self.store, &selectors, selected)
    }

    pub fn spoiler_files<I: AsRef<str>>(&self, ids: &[I], spoiler: bool) -> Result<CmdResult> {
        let selectors = parse_selectors(ids)?;
        commands::update::spoiler(&self.store, &selectors, spoiler)
    }

    pub fn rename_file(&self, id: &str, name: &str) -> Result<CmdResult> {
        let selector = parse_selector(id)?;
        commands::update::rename(&self.store, &selector, name)
    }

    pub fn delete_files<I: AsRef<str>>(&self, ids: &[I]) -> Result<CmdResult> {
        let selectors: Vec<FileSelector> = parse_selectors(ids)?;
        commands::delete::run(&self.store, &selectors)
    }

    pub fn delete_selected(&self) -> CmdResult {
        commands::delete::selected(&self.store)
    }

    pub fn delete_all(&self) -> CmdResult {
        commands::delete::all(&self.store)
    }

    pub fn submit(&self, target: &str, destination: &Path, fail: bool) -> Result<CmdResult> {
        let target = parse_target(target)?;
        self.store.reclaim_stale_taken(self.config.taken_ttl());
        commands::submit::run(&self.store, &target, destination, fail)
    }

    pub fn reclaim_stale(&self) -> CmdResult {
        commands::submit::reclaim(&self.store, self.config.taken_ttl())
    }

    pub fn doctor(&self) -> Result<CmdResult> {
        commands::doctor::run(&self.store, self.importer.layout())
    }
}

fn parse_target(input: &str) -> Result<SubmissionTarget> {
    input.parse::<SubmissionTarget>().map_err(StageError::Validation)
}
