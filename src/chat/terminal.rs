//! Terminal harness
//!
//! Every stdin line becomes a message from the test sender without a message
//! id, so it is only accepted when test mode is on. Replies are printed as-is
//! and reactions as `REACT: <emoji>`.

use std::io::{BufRead, Write};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::{ChatTransport, InboundMessage, MessageSource, Reaction};
use crate::commands::Inbound;
use crate::error::TransportError;

pub struct TerminalTransport {
    sender: String,
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalTransport {
    /// Read from stdin, write to stdout
    pub fn stdio(sender: &str) -> Self {
        Self::new(
            sender,
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    pub fn new(sender: &str, input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            sender: sender.to_string(),
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut output = self.output.lock();
        writeln!(output, "{}", line)?;
        output.flush()?;
        Ok(())
    }
}

impl ChatTransport for TerminalTransport {
    fn send_reply(&self, _message: &InboundMessage, text: &str) -> Result<(), TransportError> {
        self.write_line(text)
    }

    fn react(&self, _message: &InboundMessage, reaction: Reaction) -> Result<(), TransportError> {
        self.write_line(&format!("REACT: {}", reaction.emoji_name()))
    }
}

impl MessageSource for TerminalTransport {
    fn listen(&self, inbox: &Sender<Inbound>) -> Result<(), TransportError> {
        let mut input = self.input.lock();
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                tracing::info!("Terminal input closed");
                return Ok(());
            }
            let content = line.trim_end_matches(['\r', '\n']);
            if content.trim().is_empty() {
                continue;
            }
            let message = InboundMessage::new(&self.sender, content);
            if inbox.send(Inbound::Message(message)).is_err() {
                return Ok(());
            }
        }
    }
}
