use std::path::PathBuf;

use chrono_tz::Tz;

use crate::{
    config::{Config, PathMap},
    domain::DeliveryTarget,
    exclude::ExclusionMatcher,
    Result,
};

/// Everything one backup run needs, resolved from a config snapshot.
///
/// Built fresh for every run and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct BackupSpec {
    /// `(source_path, archive_path)` pairs, written in order.
    pub files: Vec<PathMap>,
    /// `(source_dir, archive_root)` pairs, walked in order after the files.
    pub dirs: Vec<PathMap>,
    pub exclusions: ExclusionMatcher,
    pub target: DeliveryTarget,
    /// Archives of this size or larger go through the client channel.
    pub threshold: u64,
    pub output_dir: PathBuf,
    pub archive_name: String,
    pub timezone: Tz,
}

impl BackupSpec {
    pub fn from_config(cfg: &Config, target: DeliveryTarget) -> Result<Self> {
        Ok(Self {
            files: cfg.include_data.files.clone(),
            dirs: cfg.include_data.dirs.clone(),
            exclusions: ExclusionMatcher::new(&cfg.archive.exclude_objects),
            target,
            threshold: cfg.archive.max_bot_upload_bytes,
            output_dir: cfg.archive.temp_backup_dir.clone(),
            archive_name: cfg.archive.archive_name.clone(),
            timezone: cfg.timezone()?,
        })
    }

    /// Default target from `backup_chat_data`.
    pub fn default_target(cfg: &Config) -> DeliveryTarget {
        DeliveryTarget::new(
            cfg.backup_chat_data.id,
            Some(cfg.backup_chat_data.thread_id),
        )
    }
}
