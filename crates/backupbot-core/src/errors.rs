use std::{path::PathBuf, time::Duration};

/// Core error type for the backup bot.
///
/// Adapter crates should map their specific errors into this type so the
/// pipeline can report failures consistently (chat message vs operator log).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("archive error: {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
