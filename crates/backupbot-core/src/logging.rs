use std::{fs::OpenOptions, path::Path};

use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, EnvFilter};

use crate::Result;

/// Default log file used when `enable_log_file` is set.
pub const DEFAULT_LOG_FILE: &str = "backupbot.log";

/// Initialize tracing for the bot.
///
/// Console output always; when `log_file` is given, the same events are also
/// appended to that file.
pub fn init(service_name: &str, log_file: Option<&Path>) -> Result<()> {
    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "warn,backupbot=info,backupbot_core=info,backupbot_telegram=info,{}=info",
                service_name.replace('-', "_")
            ))
        })
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let _ = fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(std::sync::Mutex::new(file)))
                .try_init();
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_ansi(true)
                .try_init();
        }
    }

    Ok(())
}
