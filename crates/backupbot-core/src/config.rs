use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::{Duration, SystemTime},
};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::{errors::Error, Result};

/// Telegram Bot API hard limit for `sendDocument` (20MB minus a little slack).
pub const DEFAULT_MAX_BOT_UPLOAD_BYTES: u64 = 20_971_510;
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONFIG_FILE: &str = "backup_config.yml";

/// Typed configuration, deserialized from `backup_config.yml`.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub include_data: IncludeData,
    #[serde(default)]
    pub admins: Vec<i64>,
    pub backup_chat_data: BackupChatData,
    #[serde(default)]
    pub client_api_data: ClientApiData,
    #[serde(default, rename = "enable_log_file")]
    pub log_file: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub send_archive_on_start: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub exclude_objects: Vec<String>,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default = "default_temp_dir")]
    pub temp_backup_dir: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub backup_times: Vec<String>,
    #[serde(default = "default_max_bot_upload")]
    pub max_bot_upload_bytes: u64,
    #[serde(default = "default_client_timeout")]
    pub client_timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            exclude_objects: Vec::new(),
            archive_name: default_archive_name(),
            temp_backup_dir: default_temp_dir(),
            timezone: default_timezone(),
            backup_times: Vec::new(),
            max_bot_upload_bytes: default_max_bot_upload(),
            client_timeout_secs: default_client_timeout(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct IncludeData {
    #[serde(default)]
    pub dirs: Vec<PathMap>,
    #[serde(default)]
    pub files: Vec<PathMap>,
}

/// `path` on disk → `archive_path` inside the archive.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PathMap {
    pub path: String,
    pub archive_path: String,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct BackupChatData {
    pub id: i64,
    #[serde(default)]
    pub thread_id: i32,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClientApiData {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub hash: String,
}

fn default_archive_name() -> String {
    "backup".to_string()
}

fn default_temp_dir() -> PathBuf {
    env::temp_dir()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_bot_upload() -> u64 {
    DEFAULT_MAX_BOT_UPLOAD_BYTES
}

fn default_client_timeout() -> u64 {
    DEFAULT_CLIENT_TIMEOUT_SECS
}

impl Config {
    /// Path of the config file: `$BACKUP_CONFIG` or `./backup_config.yml`.
    pub fn default_path() -> PathBuf {
        env::var_os("BACKUP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut cfg = Self::from_yaml(&raw)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(token) = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            self.bot.token = token;
        }
        if let Some(id) = env_str("TELEGRAM_API_ID").and_then(|s| s.trim().parse::<i32>().ok()) {
            self.client_api_data.id = id;
        }
        if let Some(hash) = env_str("TELEGRAM_API_HASH").and_then(non_empty) {
            self.client_api_data.hash = hash;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.token.trim().is_empty() {
            return Err(Error::Config(
                "bot.token (or TELEGRAM_BOT_TOKEN) is required".to_string(),
            ));
        }
        self.timezone()?;
        if self.archive.max_bot_upload_bytes == 0 {
            return Err(Error::Config(
                "archive.max_bot_upload_bytes must be > 0".to_string(),
            ));
        }
        if self.archive.client_timeout_secs == 0 {
            return Err(Error::Config(
                "archive.client_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.archive.archive_name.contains('/') {
            return Err(Error::Config(
                "archive.archive_name must not contain '/'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.archive.timezone.parse::<Tz>().map_err(|e| {
            Error::Config(format!("invalid timezone {}: {e}", self.archive.timezone))
        })
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.archive.client_timeout_secs)
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file
            .then(|| PathBuf::from(crate::logging::DEFAULT_LOG_FILE))
    }
}

/// Holds the current immutable configuration snapshot.
///
/// Readers clone the `Arc`; a reload swaps the pointer and never mutates a
/// snapshot somebody may still be using.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(path: Option<PathBuf>, cfg: Config) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(cfg)),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn modified(&self) -> Option<SystemTime> {
        let path = self.path.as_ref()?;
        fs::metadata(path).ok()?.modified().ok()
    }

    /// Re-read the file and swap the snapshot. The old snapshot stays in place on error.
    pub fn reload(&self) -> Result<Arc<Config>> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot());
        };
        let next = Arc::new(Config::load_from(path)?);
        self.swap(next.clone());
        Ok(next)
    }

    pub fn swap(&self, next: Arc<Config>) {
        match self.current.write() {
            Ok(mut g) => *g = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
