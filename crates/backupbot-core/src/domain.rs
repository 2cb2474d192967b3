use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, Bot API convention: negative for groups).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Forum topic (message thread) id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(pub i32);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where an archive (or a report about it) is posted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeliveryTarget {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
}

impl DeliveryTarget {
    pub fn new(chat_id: i64, thread_id: Option<i32>) -> Self {
        Self {
            chat_id: ChatId(chat_id),
            // Telegram reports "no topic" as 0.
            thread_id: thread_id.filter(|t| *t != 0).map(ThreadId),
        }
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(t) => write!(f, "{}/{}", self.chat_id.0, t.0),
            None => write!(f, "{}", self.chat_id.0),
        }
    }
}

/// What caused a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Schedule { expr: String },
    Command { user_id: Option<UserId> },
    Startup,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Schedule { expr } => write!(f, "schedule({expr})"),
            Trigger::Command { .. } => f.write_str("command"),
            Trigger::Startup => f.write_str("startup"),
        }
    }
}

/// A typed request for one build-and-deliver run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub target: DeliveryTarget,
    pub trigger: Trigger,
}
