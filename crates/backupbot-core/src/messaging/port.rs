use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{DeliveryTarget, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Bot channel: text messages and small document uploads.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, target: DeliveryTarget, html: &str) -> Result<MessageRef>;

    /// Upload `path` as a document in a single request.
    async fn send_document(
        &self,
        target: DeliveryTarget,
        path: &Path,
        caption_html: Option<&str>,
    ) -> Result<MessageRef>;
}

/// Client channel: authenticated session with chunked uploads for archives
/// above the bot limit.
///
/// Implementations authenticate (reusing a still-valid session), upload and
/// send. Callers bound the whole call with a timeout and never retry it.
#[async_trait]
pub trait ClientChannel: Send + Sync {
    async fn send_large(&self, target: DeliveryTarget, path: &Path, caption: &str) -> Result<()>;
}
