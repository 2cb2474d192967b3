use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use backupbot_core::{
    backup::BackupSpec,
    domain::{DeliveryTarget, RunRequest, Trigger, UserId},
};

use crate::router::AppState;

use super::origin;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Where an on-demand backup goes: the originating chat, else the configured default.
fn backup_target(origin: DeliveryTarget, default: DeliveryTarget) -> DeliveryTarget {
    if origin.chat_id.0 == 0 {
        default
    } else {
        origin
    }
}

fn start_message(target: DeliveryTarget) -> String {
    format!(
        "The /start command has been successfully processed. ChatID <code>{}</code>, ThreadID <code>{}</code>",
        target.chat_id.0,
        target.thread_id.map(|t| t.0).unwrap_or(0)
    )
}

async fn reply(state: &AppState, target: DeliveryTarget, html: &str) {
    if let Err(e) = state.messenger.send_html(target, html).await {
        tracing::warn!(target = %target, error = %e, "Failed to send reply");
    }
}

pub async fn handle_command(
    msg: &Message,
    text: &str,
    user_id: Option<UserId>,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let here = origin(msg);
    let (cmd, _arg) = parse_command(text);

    match cmd.as_str() {
        "start" => {
            reply(&state, here, &start_message(here)).await;
            tracing::info!(
                chat_id = here.chat_id.0,
                thread_id = here.thread_id.map(|t| t.0).unwrap_or(0),
                "The /start command has been successfully processed"
            );
        }

        "backup" => {
            let cfg = state.config.snapshot();
            let request = RunRequest {
                target: backup_target(here, BackupSpec::default_target(&cfg)),
                trigger: Trigger::Command { user_id },
            };
            tracing::info!(target = %request.target, "On-demand backup requested");
            if let Err(e) = state.pipeline.submit(request).await {
                tracing::error!(error = %e, "Failed to queue backup");
                reply(&state, here, "Backup could not be started.").await;
            }
        }

        "status" => {
            let html = state.scheduler.status_html().await;
            reply(&state, here, &html).await;
        }

        _ => {}
    }

    Ok(())
}
