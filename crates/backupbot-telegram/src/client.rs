//! MTProto client channel for archives above the Bot API upload limit.
//!
//! Logs in as the bot through the user API (`client_api_data`), uploads the
//! file in chunks and sends it as a document. The serialized session is kept
//! in memory between runs so a still-authorized session skips the login.

use std::path::Path;

use async_trait::async_trait;
use grammers_client::{types::InputMessage, Client, Config as ClientConfig, InitParams};
use grammers_session::{PackedChat, PackedType, Session};
use tokio::sync::Mutex;

use backupbot_core::{
    domain::DeliveryTarget, errors::Error, messaging::port::ClientChannel, Result,
};

/// Bot API ids of supergroups and channels are `-100` followed by the MTProto id.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

pub struct MtProtoClient {
    api_id: i32,
    api_hash: String,
    bot_token: String,
    session: Mutex<Option<Vec<u8>>>,
}

impl MtProtoClient {
    pub fn new(api_id: i32, api_hash: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
            bot_token: bot_token.into(),
            session: Mutex::new(None),
        }
    }

    fn ensure_credentials(&self) -> Result<()> {
        if self.api_id == 0 || self.api_hash.trim().is_empty() {
            return Err(Error::Config(
                "client_api_data.id and client_api_data.hash are required for large archives"
                    .to_string(),
            ));
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Client> {
        self.ensure_credentials()?;

        let mut saved = self.session.lock().await;
        let session = match saved.as_deref().map(Session::load) {
            Some(Ok(s)) => s,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Stored client session is unreadable, starting fresh");
                Session::new()
            }
            None => Session::new(),
        };

        let client = Client::connect(ClientConfig {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| Error::Delivery(format!("client connect failed: {e}")))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| Error::Delivery(format!("client auth check failed: {e}")))?;

        if authorized {
            tracing::debug!("Reusing client session");
        } else {
            tracing::info!("Signing in client session as bot");
            client
                .bot_sign_in(&self.bot_token)
                .await
                .map_err(|e| Error::Delivery(format!("client sign-in failed: {e}")))?;
        }

        *saved = Some(client.session().save());
        Ok(client)
    }
}

#[async_trait]
impl ClientChannel for MtProtoClient {
    async fn send_large(&self, target: DeliveryTarget, path: &Path, caption: &str) -> Result<()> {
        let client = self.connect().await?;

        let uploaded = client
            .upload_file(path)
            .await
            .map_err(|e| Error::Delivery(format!("client upload failed: {e}")))?;

        let mut message = InputMessage::text(caption).document(uploaded);
        if let Some(thread) = target.thread_id {
            message = message.reply_to(Some(thread.0));
        }

        client
            .send_message(packed_chat(target.chat_id.0), message)
            .await
            .map_err(|e| Error::Delivery(format!("client send failed: {e}")))?;

        tracing::info!(
            chat_id = target.chat_id.0,
            file_path = %path.display(),
            "Client upload sent"
        );
        Ok(())
    }
}

/// Map a Bot API chat id onto the MTProto peer it names.
fn packed_chat(bot_api_id: i64) -> PackedChat {
    let (ty, id) = if bot_api_id > 0 {
        (PackedType::User, bot_api_id)
    } else if bot_api_id > -CHANNEL_ID_OFFSET {
        (PackedType::Chat, -bot_api_id)
    } else {
        (PackedType::Megagroup, -bot_api_id - CHANNEL_ID_OFFSET)
    };
    PackedChat {
        ty,
        id,
        access_hash: None,
    }
}
