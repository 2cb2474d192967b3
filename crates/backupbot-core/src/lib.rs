//! Core of the Telegram backup agent.
//!
//! Archive building, exclusion matching, size-based delivery routing and cron
//! scheduling. Telegram transports live behind ports implemented in the
//! `backupbot-telegram` adapter crate.

pub mod archive;
pub mod backup;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod exclude;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod paths;
pub mod pipeline;
pub mod scheduler;
pub mod security;

pub use errors::{Error, Result};
