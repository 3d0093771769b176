//! # Configuration
//!
//! Replystage configuration is managed by [`confique`], layering environment
//! variables over a TOML file over compiled defaults.
//!
//! ## Resolution
//!
//! The staging root is resolved first, in priority order:
//! 1. An explicit root passed by the caller (the CLI's `--root`).
//! 2. The `REPLYSTAGE_ROOT` environment variable.
//! 3. The OS data directory (via `directories`).
//!
//! The remaining settings are then read from environment variables and
//! `<root>/replystage.toml`, falling back to `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `max_visible_attachables` | `32` | Files described individually in a snapshot |
//! | `taken_ttl_secs` | `900` | Age after which a taken file is reclaimed |
//! | `limits.max_files_per_post` | unset | Files allowed in one post |
//! | `limits.max_total_size` | unset | Bytes allowed across a post's files |
//! | `limits.max_file_size` | unset | Bytes allowed per non-video file |
//! | `limits.max_video_size` | unset | Bytes allowed per video file |
//! | `limits.spoilers` | `false` | Whether the board supports spoilers |

use crate::enumerate::{PostingLimits, StaticLimits};
use crate::error::{Result, StageError};
use crate::store::layout::StageLayout;
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "replystage.toml";
pub const ROOT_ENV: &str = "REPLYSTAGE_ROOT";

/// Configuration for replystage, stored in `replystage.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Directory holding the staging area.
    #[config(env = "REPLYSTAGE_ROOT")]
    pub root: Option<PathBuf>,

    #[config(default = 32)]
    pub max_visible_attachables: usize,

    /// Seconds a file may stay taken before it is put back.
    #[config(default = 900)]
    pub taken_ttl_secs: u64,

    #[config(nested)]
    pub limits: LimitsConfig,
}

/// Posting limits applied to every board.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    pub max_files_per_post: Option<usize>,
    pub max_total_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub max_video_size: Option<u64>,
    #[config(default = false)]
    pub spoilers: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files_per_post: None,
            max_total_size: None,
            max_file_size: None,
            max_video_size: None,
            spoilers: false,
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_visible_attachables: 32,
            taken_ttl_secs: 900,
            limits: LimitsConfig::default(),
        }
    }
}

impl StageConfig {
    /// Resolves the root, then loads the rest from the environment and the
    /// root's config file.
    pub fn load(root_override: Option<&Path>) -> Result<Self> {
        let root = match root_override {
            Some(root) => root.to_path_buf(),
            None => match std::env::var_os(ROOT_ENV) {
                Some(root) => PathBuf::from(root),
                None => default_root()?,
            },
        };

        let mut config = Self::builder()
            .env()
            .file(root.join(CONFIG_FILE_NAME))
            .load()
            .map_err(|err| StageError::Config(err.to_string()))?;
        config.root = Some(root);
        Ok(config)
    }

    /// Loads only `<root>/replystage.toml`, ignoring the environment.
    pub fn load_file(root: &Path) -> Result<Self> {
        let mut config = Self::builder()
            .file(root.join(CONFIG_FILE_NAME))
            .load()
            .map_err(|err| StageError::Config(err.to_string()))?;
        config.root = Some(root.to_path_buf());
        Ok(config)
    }

    pub fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => default_root(),
        }
    }

    pub fn layout(&self) -> Result<StageLayout> {
        Ok(StageLayout::under(&self.root()?))
    }

    pub fn taken_ttl(&self) -> Duration {
        Duration::from_secs(self.taken_ttl_secs)
    }

    pub fn posting_limits(&self) -> PostingLimits {
        PostingLimits {
            max_files_per_post: self.limits.max_files_per_post,
            max_total_size: self.limits.max_total_size,
            max_file_size: self.limits.max_file_size,
            max_video_size: self.limits.max_video_size,
            spoilers: self.limits.spoilers,
        }
    }

    pub fn limits_provider(&self) -> StaticLimits {
        StaticLimits::new(self.posting_limits())
    }
}

fn default_root() -> Result<PathBuf> {
    ProjectDirs::from("", "", "replystage")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| StageError::Config("could not determine a data directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoardKey;
    use crate::enumerate::LimitsProvider;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StageConfig::default();
        assert_eq!(config.max_visible_attachables, 32);
        assert_eq!(config.taken_ttl(), Duration::from_secs(900));
        assert_eq!(config.posting_limits(), PostingLimits::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StageConfig::load_file(dir.path()).unwrap();
        assert_eq!(config.max_visible_attachables, 32);
        assert_eq!(config.root, Some(dir.path().to_path_buf()));
        assert_eq!(config.layout().unwrap(), StageLayout::under(dir.path()));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "max_visible_attachables = 8\ntaken_ttl_secs = 60\n\n[limits]\nmax_files_per_post = 4\nmax_file_size = 4194304\nspoilers = true\n",
        )
        .unwrap();

        let config = StageConfig::load_file(dir.path()).unwrap();
        assert_eq!(config.max_visible_attachables, 8);
        assert_eq!(config.taken_ttl_secs, 60);

        let limits = config
            .limits_provider()
            .limits_for(&BoardKey::new("any", "board"));
        assert_eq!(limits.max_files_per_post, Some(4));
        assert_eq!(limits.max_file_size, Some(4_194_304));
        assert_eq!(limits.max_total_size, None);
        assert!(limits.spoilers);
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "max_visible_attachables = \"lots\"").unwrap();

        assert!(matches!(
            StageConfig::load_file(dir.path()),
            Err(StageError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let config = StageConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.root().unwrap(), dir.path());
    }
}
