use thiserror::Error;

/// Application-level errors using thiserror for structured error handling.
///
/// Each enum covers one failure domain. The binary chains them with anyhow;
/// the dispatcher only ever turns them into log lines and a failure reaction.

#[derive(Error, Debug)]
pub enum MixerError {
    #[error("Failed to connect to mixer at {url}")]
    ConnectFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Mixer handshake failed: {0}")]
    Handshake(String),

    #[error("Mixer rejected authentication")]
    AuthenticationFailed,

    #[error("Mixer connection lost")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Timed out waiting for mixer response")]
    Timeout,

    #[error("Malformed mixer message: {0}")]
    Protocol(String),

    #[error("Mixer request {request} failed with code {code}: {comment}")]
    RequestFailed {
        request: String,
        code: i64,
        comment: String,
    },

    #[error("Not connected to mixer")]
    NotConnected,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine the platform config directory")]
    NoConfigDirectory,

    #[error("Invalid command pattern")]
    Pattern(#[from] regex::Error),
}

/// Failure raised by a command handler. Never shown to chat users in detail.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Mixer call failed")]
    Mixer(#[from] MixerError),

    #[error("Raising requested exception")]
    Requested,
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Mixer is missing configured items ({})", describe_missing(.scenes, .sources))]
    Missing {
        scenes: Vec<String>,
        sources: Vec<String>,
    },

    #[error("Startup check could not reach the mixer")]
    Mixer(#[from] MixerError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Chat request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Chat server returned error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unexpected chat server response: {0}")]
    Malformed(String),

    #[error("Terminal I/O failed")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Zulip reports an expired event queue with this code; callers re-register.
    pub fn is_bad_event_queue(&self) -> bool {
        matches!(self, TransportError::Api { code, .. } if code == "BAD_EVENT_QUEUE_ID")
    }
}

fn describe_missing(scenes: &[String], sources: &[String]) -> String {
    let mut parts = Vec::new();
    if !scenes.is_empty() {
        parts.push(format!("scenes: {}", quoted(scenes)));
    }
    if !sources.is_empty() {
        parts.push(format!("sources: {}", quoted(sources)));
    }
    parts.join("; ")
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{}'", name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = HandlerError::Requested;
        assert_eq!(err.to_string(), "Raising requested exception");

        let err = MixerError::RequestFailed {
            request: "SetCurrentProgramScene".to_string(),
            code: 600,
            comment: "No source was found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Mixer request SetCurrentProgramScene failed with code 600: No source was found"
        );
    }

    #[test]
    fn test_missing_items_message() {
        let err = StartupError::Missing {
            scenes: vec!["Title card".to_string()],
            sources: vec!["Mic/Aux".to_string(), "Timing text".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Mixer is missing configured items (scenes: 'Title card'; sources: 'Mic/Aux', 'Timing text')"
        );

        let err = StartupError::Missing {
            scenes: Vec::new(),
            sources: vec!["Mic/Aux".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Mixer is missing configured items (sources: 'Mic/Aux')"
        );
    }

    #[test]
    fn test_error_source_chain() {
        let handler_err = HandlerError::from(MixerError::NotConnected);
        assert!(handler_err.source().is_some());
        assert_eq!(handler_err.to_string(), "Mixer call failed");

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };
        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }

    #[test]
    fn test_bad_event_queue_detection() {
        let err = TransportError::Api {
            code: "BAD_EVENT_QUEUE_ID".to_string(),
            message: "Bad event queue id".to_string(),
        };
        assert!(err.is_bad_event_queue());

        let err = TransportError::Api {
            code: "BAD_REQUEST".to_string(),
            message: "nope".to_string(),
        };
        assert!(!err.is_bad_event_queue());
    }
}
