use std::sync::Arc;

use backupbot_core::config::{Config, ConfigStore};

#[tokio::main]
async fn main() -> Result<(), backupbot_core::Error> {
    let cfg = Config::load()?;
    let path = Config::default_path();
    backupbot_core::logging::init("backupbot", cfg.log_file_path().as_deref())?;
    tracing::info!(config = %path.display(), "Config loaded");

    let config = Arc::new(ConfigStore::new(Some(path), cfg));
    backupbot_telegram::router::run_polling(config)
        .await
        .map_err(|e| backupbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
