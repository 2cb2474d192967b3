//! Telegram adapters (teloxide bot channel, grammers client channel).
//!
//! This crate implements the `backupbot-core` messaging ports over the Telegram
//! Bot API and MTProto, and hosts the command dispatcher.

use std::{future::IntoFuture, path::Path, time::Duration};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod client;
pub mod handlers;
pub mod router;

pub use client::MtProtoClient;

use backupbot_core::{
    config::DEFAULT_MAX_BOT_UPLOAD_BYTES,
    domain::{ChatId, DeliveryTarget, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, max_retries: usize, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        call_with_retries(max_retries, op, retry_after)
            .await
            .map_err(Self::map_err)
    }
}

/// Text messages get one retry after a 429.
const MESSAGE_RETRIES: usize = 1;
/// Archive uploads are sent once; a failed upload ends the delivery.
const UPLOAD_RETRIES: usize = 0;

fn retry_after(e: &teloxide::RequestError) -> Option<Duration> {
    match e {
        teloxide::RequestError::RetryAfter(d) => Some(*d),
        _ => None,
    }
}

/// Run `op`, repeating it up to `max_retries` times while `retry_after` asks for a wait.
async fn call_with_retries<T, E, Fut>(
    max_retries: usize,
    mut op: impl FnMut() -> Fut,
    retry_after: impl Fn(&E) -> Option<Duration>,
) -> std::result::Result<T, E>
where
    Fut: IntoFuture<Output = std::result::Result<T, E>>,
{
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match retry_after(&e) {
                Some(d) if attempts < max_retries => {
                    attempts += 1;
                    tracing::warn!(retry_after = ?d, "Telegram rate limit hit, retrying");
                    sleep(d).await;
                }
                _ => return Err(e),
            },
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_upload_bytes: DEFAULT_MAX_BOT_UPLOAD_BYTES,
        }
    }

    async fn send_html(&self, target: DeliveryTarget, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(MESSAGE_RETRIES, || {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(target.chat_id), html.to_string())
                    .parse_mode(ParseMode::Html);
                if let Some(thread) = target.thread_id {
                    req = req.message_thread_id(thread.0);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: target.chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_document(
        &self,
        target: DeliveryTarget,
        path: &Path,
        caption_html: Option<&str>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(UPLOAD_RETRIES, || {
                let mut req = self.bot.send_document(
                    Self::tg_chat(target.chat_id),
                    InputFile::file(path.to_path_buf()),
                );
                if let Some(caption) = caption_html {
                    req = req.caption(caption.to_string()).parse_mode(ParseMode::Html);
                }
                if let Some(thread) = target.thread_id {
                    req = req.message_thread_id(thread.0);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: target.chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}
