//! Zulip REST transport
//!
//! Long-polls an event queue for new messages and answers through the
//! messages and reactions endpoints. Authentication is HTTP basic auth with
//! the bot's email and API key.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crossbeam_channel::Sender;
use serde::Deserialize;
use serde_json::Value;

use super::{ChatTransport, InboundMessage, MessageSource, Reaction};
use crate::commands::Inbound;
use crate::config::ZulipSettings;
use crate::error::TransportError;

/// Zulip sends a heartbeat at least this often on an idle queue
const POLL_TIMEOUT: Duration = Duration::from_secs(90);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct EventQueue {
    queue_id: String,
    last_event_id: i64,
}

#[derive(Debug, Deserialize)]
struct EventBatch {
    #[serde(default)]
    events: Vec<ZulipEvent>,
}

#[derive(Debug, Deserialize)]
struct ZulipEvent {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<InboundMessage>,
}

pub struct ZulipTransport {
    settings: ZulipSettings,
    agent: ureq::Agent,
    auth_header: String,
}

impl ZulipTransport {
    pub fn new(settings: ZulipSettings) -> Self {
        let credentials = format!("{}:{}", settings.email, settings.api_key);
        let auth_header = format!("Basic {}", BASE64.encode(credentials.as_bytes()));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(POLL_TIMEOUT)
            .user_agent(&format!("ObsChatRemote/{}", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            settings,
            agent,
            auth_header,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.settings.site.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, TransportError> {
        let url = self.api_url(path);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.auth_header)
            .timeout(REQUEST_TIMEOUT)
            .send_form(form);
        read_response(&url, response)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, TransportError> {
        let url = self.api_url(path);
        let mut request = self.agent.get(&url).set("Authorization", &self.auth_header);
        for (key, value) in query {
            request = request.query(key, value);
        }
        read_response(&url, request.call())
    }

    fn register(&self) -> Result<EventQueue, TransportError> {
        let body = self.post("register", &[("event_types", r#"["message"]"#)])?;
        let queue: EventQueue = serde_json::from_value(body)
            .map_err(|e| TransportError::Malformed(format!("register: {}", e)))?;
        tracing::info!("Registered Zulip event queue {}", queue.queue_id);
        Ok(queue)
    }

    fn poll(&self, queue: &EventQueue) -> Result<Vec<ZulipEvent>, TransportError> {
        let last_event_id = queue.last_event_id.to_string();
        let body = self.get(
            "events",
            &[
                ("queue_id", queue.queue_id.as_str()),
                ("last_event_id", last_event_id.as_str()),
            ],
        )?;
        let batch: EventBatch = serde_json::from_value(body)
            .map_err(|e| TransportError::Malformed(format!("events: {}", e)))?;
        Ok(batch.events)
    }
}

impl ChatTransport for ZulipTransport {
    fn send_reply(&self, message: &InboundMessage, text: &str) -> Result<(), TransportError> {
        let form = reply_form(message, text)?;
        let pairs: Vec<(&str, &str)> = form.iter().map(|(key, value)| (*key, value.as_str())).collect();
        self.post("messages", &pairs)?;
        Ok(())
    }

    fn react(&self, message: &InboundMessage, reaction: Reaction) -> Result<(), TransportError> {
        let id = message
            .id
            .ok_or_else(|| TransportError::Malformed("cannot react to a message without id".to_string()))?;
        self.post(
            &format!("messages/{}/reactions", id),
            &[("emoji_name", reaction.emoji_name())],
        )?;
        Ok(())
    }
}

impl MessageSource for ZulipTransport {
    fn listen(&self, inbox: &Sender<Inbound>) -> Result<(), TransportError> {
        let mut queue: Option<EventQueue> = None;

        loop {
            let current = match queue.take() {
                Some(current) => current,
                None => match self.register() {
                    Ok(registered) => registered,
                    Err(e) => {
                        tracing::warn!("Zulip register failed: {}; retrying", e);
                        std::thread::sleep(RETRY_BACKOFF);
                        continue;
                    }
                },
            };

            let events = match self.poll(&current) {
                Ok(events) => events,
                Err(e) => {
                    queue = queue_after_failure(current, &e);
                    if queue.is_some() {
                        tracing::warn!("Zulip poll failed: {}; retrying", e);
                        std::thread::sleep(RETRY_BACKOFF);
                    } else {
                        tracing::info!("Zulip event queue expired; registering a new one");
                    }
                    continue;
                }
            };

            let next = current.advanced(&events);
            for message in inbound_messages(events, &self.settings.email) {
                if inbox.send(Inbound::Message(message)).is_err() {
                    tracing::info!("Executor gone, stopping Zulip listener");
                    return Ok(());
                }
            }
            queue = Some(next);
        }
    }
}

impl EventQueue {
    /// Same queue, positioned after every event in `events`
    fn advanced(self, events: &[ZulipEvent]) -> Self {
        let last_event_id = events
            .iter()
            .map(|event| event.id)
            .fold(self.last_event_id, i64::max);
        Self {
            queue_id: self.queue_id,
            last_event_id,
        }
    }
}

/// Queue to keep polling after a failed poll; `None` means register again
fn queue_after_failure(current: EventQueue, err: &TransportError) -> Option<EventQueue> {
    if err.is_bad_event_queue() {
        None
    } else {
        Some(current)
    }
}

/// Message events worth dispatching, minus the bot's own messages
fn inbound_messages(events: Vec<ZulipEvent>, bot_email: &str) -> Vec<InboundMessage> {
    events
        .into_iter()
        .filter(|event| event.kind == "message")
        .filter_map(|event| event.message)
        .filter(|message| !message.sender.eq_ignore_ascii_case(bot_email))
        .collect()
}

/// Form fields for a reply in the same conversation as `message`.
///
/// Stream messages get an answer in the same stream and topic. Private
/// messages go to every participant, or back to the sender when the
/// recipient list is missing.
fn reply_form(message: &InboundMessage, text: &str) -> Result<Vec<(&'static str, String)>, TransportError> {
    if message.is_stream() {
        let stream = message.stream().ok_or_else(|| {
            TransportError::Malformed("stream message without a stream name".to_string())
        })?;
        return Ok(vec![
            ("type", "stream".to_string()),
            ("to", stream.to_string()),
            ("topic", message.subject.clone()),
            ("content", text.to_string()),
        ]);
    }

    let mut recipients = message.private_recipients();
    if recipients.is_empty() {
        recipients.push(message.sender.clone());
    }
    let to = serde_json::to_string(&recipients).map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok(vec![
        ("type", "private".to_string()),
        ("to", to),
        ("content", text.to_string()),
    ])
}

/// Turn a ureq result into the JSON body of a successful Zulip call
fn read_response(
    url: &str,
    response: Result<ureq::Response, ureq::Error>,
) -> Result<Value, TransportError> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            let body: Value = response.into_json().unwrap_or(Value::Null);
            return Err(api_error(&body, status));
        }
        Err(e) => {
            return Err(TransportError::Http {
                url: url.to_string(),
                source: Box::new(e),
            })
        }
    };

    let body: Value = response
        .into_json()
        .map_err(|e| TransportError::Malformed(format!("{}: {}", url, e)))?;
    if body.get("result").and_then(Value::as_str) == Some("success") {
        Ok(body)
    } else {
        Err(api_error(&body, 200))
    }
}

fn api_error(body: &Value, status: u16) -> TransportError {
    let code = body
        .get("code")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP_{}", status));
    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();
    TransportError::Api { code, message }
}
