//! Size-based routing of a finished archive to the bot or client channel.
//!
//! Routing happens before any upload: the bot channel rejects payloads above
//! its ceiling, so there is no "try small, fall back to large" path.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    archive::Archive,
    domain::DeliveryTarget,
    errors::Error,
    formatting::{escape_html, format_bytes, truncate_text},
    messaging::port::{ClientChannel, MessagingPort},
};

const MAX_ERROR_LEN: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Bot,
    Client,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Bot => f.write_str("bot"),
            Channel::Client => f.write_str("client"),
        }
    }
}

/// Result of the single delivery attempt of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub channel: Channel,
    pub success: bool,
    pub bytes_sent: u64,
    pub error: Option<String>,
}

/// `size < threshold` goes through the bot, everything else through the client.
pub fn select_channel(size: u64, threshold: u64) -> Channel {
    if size < threshold {
        Channel::Bot
    } else {
        Channel::Client
    }
}

pub struct DeliveryRouter {
    bot: Arc<dyn MessagingPort>,
    client: Arc<dyn ClientChannel>,
    client_timeout: Duration,
}

impl DeliveryRouter {
    pub fn new(
        bot: Arc<dyn MessagingPort>,
        client: Arc<dyn ClientChannel>,
        client_timeout: Duration,
    ) -> Self {
        Self {
            bot,
            client,
            client_timeout,
        }
    }

    /// Deliver `archive` to `target`. Exactly one attempt, never retried.
    pub async fn deliver(
        &self,
        archive: &Archive,
        target: DeliveryTarget,
        threshold: u64,
    ) -> DeliveryOutcome {
        let size = archive.size();
        let file_name = archive.file_name();
        let channel = select_channel(size, threshold);

        let res = match channel {
            Channel::Bot => {
                tracing::info!(
                    file_name = %file_name,
                    file_size = size,
                    target = %target,
                    "Sending archive via bot"
                );
                let caption = archive_caption(&file_name, size);
                self.bot
                    .send_document(target, archive.path(), Some(&caption))
                    .await
                    .map(|_| ())
            }
            Channel::Client => {
                tracing::info!(
                    file_name = %file_name,
                    file_size = size,
                    target = %target,
                    "Sending archive via client"
                );
                let caption = format!("{file_name} ({})", format_bytes(size));
                match tokio::time::timeout(
                    self.client_timeout,
                    self.client.send_large(target, archive.path(), &caption),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(Error::Timeout(self.client_timeout)),
                }
            }
        };

        match res {
            Ok(()) => {
                tracing::info!(file_name = %file_name, channel = %channel, "Archive sent");
                DeliveryOutcome {
                    channel,
                    success: true,
                    bytes_sent: size,
                    error: None,
                }
            }
            Err(e) => {
                let err = truncate_text(&e.to_string(), MAX_ERROR_LEN);
                tracing::error!(
                    file_name = %file_name,
                    channel = %channel,
                    error = %err,
                    "Failed to send archive"
                );
                self.report_failure(target, &file_name, &err).await;
                DeliveryOutcome {
                    channel,
                    success: false,
                    bytes_sent: 0,
                    error: Some(err),
                }
            }
        }
    }

    async fn report_failure(&self, target: DeliveryTarget, file_name: &str, err: &str) {
        let html = format!(
            "Failed to send archive <code>{}</code>: {}",
            escape_html(file_name),
            escape_html(err)
        );
        if let Err(e) = self.bot.send_html(target, &html).await {
            tracing::error!(target = %target, error = %e, "Failed to report delivery failure");
        }
    }
}

fn archive_caption(file_name: &str, size: u64) -> String {
    format!(
        "<code>{}</code> ({})",
        escape_html(file_name),
        format_bytes(size)
    )
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        archive,
        backup::BackupSpec,
        domain::{ChatId, MessageId, MessageRef},
        exclude::ExclusionMatcher,
        messaging::types::MessagingCapabilities,
        Result,
    };

    #[derive(Default)]
    struct FakeBot {
        fail_upload: bool,
        documents: Mutex<Vec<(DeliveryTarget, String)>>,
        html: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessagingPort for FakeBot {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_upload_bytes: u64::MAX,
            }
        }

        async fn send_html(&self, target: DeliveryTarget, html: &str) -> Result<MessageRef> {
            self.html.lock().unwrap().push(html.to_string());
            Ok(MessageRef {
                chat_id: target.chat_id,
                message_id: MessageId(1),
            })
        }

        async fn send_document(
            &self,
            target: DeliveryTarget,
            path: &Path,
            _caption_html: Option<&str>,
        ) -> Result<MessageRef> {
            if self.fail_upload {
                return Err(Error::Delivery("Request Entity Too Large".to_string()));
            }
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.documents.lock().unwrap().push((target, name));
            Ok(MessageRef {
                chat_id: ChatId(target.chat_id.0),
                message_id: MessageId(2),
            })
        }
    }

    #[derive(Default)]
    struct FakeClient {
        stall: bool,
        reject: bool,
        sent: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ClientChannel for FakeClient {
        async fn send_large(
            &self,
            _target: DeliveryTarget,
            path: &Path,
            _caption: &str,
        ) -> Result<()> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.reject {
                return Err(Error::Delivery("client sign-in failed: AUTH_KEY_INVALID".to_string()));
            }
            self.sent.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn small_archive(out: &Path) -> archive::Archive {
        let src = out.join("payload.txt");
        fs::write(&src, b"hello backup").unwrap();
        let spec = BackupSpec {
            files: vec![crate::config::PathMap {
                path: src.to_string_lossy().into_owned(),
                archive_path: "payload.txt".to_string(),
            }],
            dirs: vec![],
            exclusions: ExclusionMatcher::default(),
            target: DeliveryTarget::new(1, None),
            threshold: 1024,
            output_dir: out.join("out"),
            archive_name: "router".to_string(),
            timezone: chrono_tz::UTC,
        };
        archive::build(&spec).unwrap().0
    }

    fn router(bot: Arc<FakeBot>, client: Arc<FakeClient>, timeout: Duration) -> DeliveryRouter {
        DeliveryRouter::new(bot, client, timeout)
    }

    #[test]
    fn threshold_boundary() {
        assert_eq!(select_channel(0, 100), Channel::Bot);
        assert_eq!(select_channel(99, 100), Channel::Bot);
        assert_eq!(select_channel(100, 100), Channel::Client);
        assert_eq!(select_channel(101, 100), Channel::Client);
    }

    #[test]
    fn caption_escapes_file_name() {
        assert_eq!(archive_caption("a<b>.tar.gz", 40), "<code>a&lt;b&gt;.tar.gz</code> (40 B)");
    }

    #[tokio::test]
    async fn archive_at_threshold_goes_to_client_one_below_to_bot() {
        let dir = tempfile::tempdir().unwrap();
        let archive = small_archive(dir.path());
        let size = archive.size();
        let target = DeliveryTarget::new(-100, Some(3));

        let bot = Arc::new(FakeBot::default());
        let client = Arc::new(FakeClient::default());
        let r = router(bot.clone(), client.clone(), Duration::from_secs(5));

        let at = r.deliver(&archive, target, size).await;
        assert_eq!(at.channel, Channel::Client);
        assert!(at.success);
        assert_eq!(client.sent.lock().unwrap().as_slice(), &[archive.path().to_path_buf()]);

        let below = r.deliver(&archive, target, size + 1).await;
        assert_eq!(below.channel, Channel::Bot);
        assert!(below.success);
        assert_eq!(below.bytes_sent, size);
        let docs = bot.documents.lock().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, target);
        assert_eq!(docs[0].1, archive.file_name());
    }

    #[tokio::test]
    async fn bot_failure_is_reported_to_chat() {
        let dir = tempfile::tempdir().unwrap();
        let archive = small_archive(dir.path());

        let bot = Arc::new(FakeBot {
            fail_upload: true,
            ..Default::default()
        });
        let r = router(bot.clone(), Arc::new(FakeClient::default()), Duration::from_secs(5));

        let outcome = r.deliver(&archive, DeliveryTarget::new(5, None), u64::MAX).await;
        assert_eq!(outcome.channel, Channel::Bot);
        assert!(!outcome.success);
        assert_eq!(outcome.bytes_sent, 0);
        assert!(outcome.error.as_deref().unwrap().contains("Too Large"));

        let html = bot.html.lock().unwrap();
        assert_eq!(html.len(), 1);
        assert!(html[0].contains(&archive.file_name()));
        assert!(html[0].contains("Too Large"));
    }

    #[tokio::test]
    async fn client_timeout_fails_the_delivery_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive = small_archive(dir.path());

        let bot = Arc::new(FakeBot::default());
        let client = Arc::new(FakeClient {
            stall: true,
            ..Default::default()
        });
        let r = router(bot.clone(), client.clone(), Duration::from_millis(50));

        let outcome = r.deliver(&archive, DeliveryTarget::new(5, None), 0).await;
        assert_eq!(outcome.channel, Channel::Client);
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("timed out"));
        assert!(client.sent.lock().unwrap().is_empty());
        assert_eq!(bot.html.lock().unwrap().len(), 1);
        assert!(bot.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_error_is_reported_to_chat() {
        let dir = tempfile::tempdir().unwrap();
        let archive = small_archive(dir.path());

        let bot = Arc::new(FakeBot::default());
        let client = Arc::new(FakeClient {
            reject: true,
            ..Default::default()
        });
        let r = router(bot.clone(), client.clone(), Duration::from_secs(5));

        let outcome = r.deliver(&archive, DeliveryTarget::new(-100, Some(4)), 1).await;
        assert_eq!(outcome.channel, Channel::Client);
        assert!(!outcome.success);
        assert_eq!(outcome.bytes_sent, 0);
        assert!(outcome.error.as_deref().unwrap().contains("AUTH_KEY_INVALID"));
        assert!(client.sent.lock().unwrap().is_empty());

        let html = bot.html.lock().unwrap();
        assert_eq!(html.len(), 1);
        assert!(html[0].contains(&archive.file_name()));
        assert!(html[0].contains("AUTH_KEY_INVALID"));
        assert!(bot.documents.lock().unwrap().is_empty());
    }
}
