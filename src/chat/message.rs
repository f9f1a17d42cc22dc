use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound chat message as delivered by the chat server.
///
/// Only `sender`, `content` and `id` matter to command dispatch; the routing
/// fields are carried so a reply can go back to the same conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundMessage {
    /// Absent only for messages injected by the local terminal harness
    #[serde(default)]
    pub id: Option<u64>,

    /// Opaque sender identifier (the sender's email on Zulip)
    #[serde(rename = "sender_email")]
    pub sender: String,

    pub content: String,

    /// `stream` or `private`
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Stream name for stream messages, list of recipients for private ones
    #[serde(default)]
    pub display_recipient: Value,

    #[serde(default)]
    pub subject: String,
}

fn default_kind() -> String {
    "private".to_string()
}

impl InboundMessage {
    /// A private message without an id, as produced by the terminal harness
    pub fn new(sender: &str, content: &str) -> Self {
        Self {
            id: None,
            sender: sender.to_string(),
            content: content.to_string(),
            kind: default_kind(),
            display_recipient: Value::Null,
            subject: String::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_stream(&self) -> bool {
        self.kind == "stream"
    }

    /// Stream name, for stream messages
    pub fn stream(&self) -> Option<&str> {
        self.display_recipient.as_str()
    }

    /// Emails of everyone in a private conversation
    pub fn private_recipients(&self) -> Vec<String> {
        self.display_recipient
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|user| user.get("email").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Acknowledgment attached to the original message instead of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    Success,
    Failure,
    Muted,
    Unmuted,
}

impl Reaction {
    /// Zulip emoji name
    pub fn emoji_name(&self) -> &'static str {
        match self {
            Reaction::Success => "check_mark",
            Reaction::Failure => "boom",
            Reaction::Muted => "mute_notifications",
            Reaction::Unmuted => "notifications",
        }
    }
}
