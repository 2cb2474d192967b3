//! Messenger-facing ports (Telegram today).

pub mod port;
pub mod types;
