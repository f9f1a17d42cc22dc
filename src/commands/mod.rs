//! Command dispatch
//!
//! ```text
//! ┌────────────┐  Inbound   ┌──────────┐  message  ┌────────────┐  Command  ┌──────────┐
//! │ chat source│ ─────────> │ Executor │ ────────> │ Dispatcher │ ────────> │ Handlers │
//! └────────────┘            └──────────┘           └────────────┘           └──────────┘
//!                                                     │  ▲                     │
//!                                        reply/react  │  │ Outcome             │ session
//!                                                     ▼  │                     ▼
//!                                                ┌───────────┐           ┌─────────┐
//!                                                │ Transport │           │  Mixer  │
//!                                                └───────────┘           └─────────┘
//! ```
//!
//! The dispatcher looks the message up in the [`CommandTable`] (first match in
//! registration order wins), runs the handler and maps its [`Outcome`] to a
//! reaction and/or reply. Handler errors become a single failure reaction.

pub mod dispatcher;
pub mod executor;
pub mod handlers;
pub mod table;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use executor::{CommandExecutor, Inbound};
pub use table::{Binding, CommandKind, CommandTable};

use crate::chat::Reaction;

/// A matched chat command with its arguments extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch the program scene; `None` asks for the scene list
    Switch { scene: Option<String> },

    /// Print usage
    Help,

    Mute,

    Unmute,

    /// Attach a test reaction
    React,

    /// Fail on purpose to exercise the failure path
    RaiseFailure,

    /// Update every OBS text source bound to `field`
    Text { field: String, content: String },
}

impl Command {
    /// Get a human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            Command::Switch { scene: Some(scene) } => format!("Switch scene: {}", scene),
            Command::Switch { scene: None } => "List scenes".to_string(),
            Command::Help => "Help".to_string(),
            Command::Mute => "Mute microphones".to_string(),
            Command::Unmute => "Unmute microphones".to_string(),
            Command::React => "Test reaction".to_string(),
            Command::RaiseFailure => "Raise test failure".to_string(),
            Command::Text { field, .. } => format!("Update text: {}", field),
        }
    }
}

/// What a handler wants sent back. Both parts are optional; an empty outcome
/// is a silent success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub reaction: Option<Reaction>,
    pub reply: Option<String>,
}

impl Outcome {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn react(reaction: Reaction) -> Self {
        Self {
            reaction: Some(reaction),
            reply: None,
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reaction: None,
            reply: Some(text.into()),
        }
    }

    /// Reply text worth sending: present and not blank
    pub fn reply_text(&self) -> Option<&str> {
        self.reply.as_deref().filter(|text| !text.trim().is_empty())
    }

    pub fn is_silent(&self) -> bool {
        self.reaction.is_none() && self.reply_text().is_none()
    }
}
