//! Chat side of the bot
//!
//! A [`MessageSource`] feeds inbound messages into the executor queue; a
//! [`ChatTransport`] delivers what the dispatcher decides to send back.

pub mod message;
pub mod terminal;
pub mod zulip;

pub use message::{InboundMessage, Reaction};
pub use terminal::TerminalTransport;
pub use zulip::ZulipTransport;

use crossbeam_channel::Sender;

use crate::commands::Inbound;
use crate::error::TransportError;

/// Outbound operations the dispatcher performs on the chat server
pub trait ChatTransport: Send + Sync {
    fn send_reply(&self, message: &InboundMessage, text: &str) -> Result<(), TransportError>;

    fn react(&self, message: &InboundMessage, reaction: Reaction) -> Result<(), TransportError>;
}

/// Something that produces inbound messages until it runs dry
pub trait MessageSource {
    /// Block, pushing every inbound message into `inbox`. Returns when the
    /// source is exhausted or the receiving side has gone away.
    fn listen(&self, inbox: &Sender<Inbound>) -> Result<(), TransportError>;
}
