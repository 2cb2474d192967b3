//! Telegram update handlers.
//!
//! Only commands are handled; every other message is ignored.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use backupbot_core::domain::{DeliveryTarget, UserId};
use backupbot_core::security::is_authorized;

use crate::router::AppState;

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    let admins = state.config.snapshot().admins.clone();
    if !is_authorized(user_id, &admins) {
        tracing::warn!(
            user_id = user_id.map(|u| u.0),
            chat_id = msg.chat.id.0,
            "Command from unauthorized user"
        );
        let mut req = bot.send_message(
            msg.chat.id,
            "Unauthorized. Contact the bot owner for access.",
        );
        if let Some(thread) = msg.thread_id {
            req = req.message_thread_id(thread);
        }
        let _ = req.await;
        return Ok(());
    }

    commands::handle_command(&msg, text, user_id, state).await
}

/// Chat and topic the message came from.
fn origin(msg: &Message) -> DeliveryTarget {
    DeliveryTarget::new(msg.chat.id.0, msg.thread_id)
}
