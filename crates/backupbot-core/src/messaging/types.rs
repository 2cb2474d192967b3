/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Largest document the bot channel accepts in one upload.
    pub max_upload_bytes: u64,
}
