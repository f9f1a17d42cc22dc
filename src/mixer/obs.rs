//! obs-websocket v5 client
//!
//! Speaks the JSON flavour of the protocol over a plain `ws://` socket:
//! Hello (op 0) -> Identify (op 1) -> Identified (op 2), then Request (op 6)
//! / RequestResponse (op 7) pairs matched by request id. Events (op 5) are
//! not subscribed to and are skipped if the server sends any.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as WsMessage, WebSocket};

use super::MixerClient;
use crate::config::MixerSettings;
use crate::error::MixerError;

const RPC_VERSION: u64 = 1;

const OP_HELLO: u64 = 0;
const OP_IDENTIFY: u64 = 1;
const OP_IDENTIFIED: u64 = 2;
const OP_REQUEST: u64 = 6;
const OP_REQUEST_RESPONSE: u64 = 7;

/// Close code OBS uses when the Identify authentication string is wrong
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct Frame {
    op: u64,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(default)]
    authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponse {
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Value,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: i64,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneList {
    scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneEntry {
    scene_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputList {
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputEntry {
    input_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentProgramScene {
    current_program_scene_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputMute {
    input_muted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSettings {
    input_settings: TextSettings,
}

#[derive(Debug, Deserialize)]
struct TextSettings {
    #[serde(default)]
    text: String,
}

/// Authentication string for Identify:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn authentication_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    BASE64.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}

pub struct ObsClient {
    settings: MixerSettings,
    socket: Option<Socket>,
    next_request_id: u64,
}

impl ObsClient {
    pub fn new(settings: MixerSettings) -> Self {
        Self {
            settings,
            socket: None,
            next_request_id: 0,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms.max(1))
    }

    fn socket(&mut self) -> Result<&mut Socket, MixerError> {
        self.socket.as_mut().ok_or(MixerError::NotConnected)
    }

    fn identify(&self, socket: &mut Socket) -> Result<(), MixerError> {
        let hello = read_frame(socket)?;
        if hello.op != OP_HELLO {
            return Err(MixerError::Handshake(format!(
                "expected Hello (op {}), got op {}",
                OP_HELLO, hello.op
            )));
        }
        let hello: Hello = serde_json::from_value(hello.d)
            .map_err(|e| MixerError::Handshake(format!("bad Hello payload: {}", e)))?;

        let mut identify = json!({
            "rpcVersion": RPC_VERSION,
            "eventSubscriptions": 0,
        });
        if let Some(auth) = hello.authentication {
            let password = self.settings.password.as_deref().ok_or_else(|| {
                MixerError::Handshake("server requires a password but none is configured".to_string())
            })?;
            identify["authentication"] =
                Value::String(authentication_response(password, &auth.salt, &auth.challenge));
        }
        send_frame(socket, OP_IDENTIFY, identify)?;

        let identified = read_frame(socket)?;
        if identified.op != OP_IDENTIFIED {
            return Err(MixerError::Handshake(format!(
                "expected Identified (op {}), got op {}",
                OP_IDENTIFIED, identified.op
            )));
        }
        Ok(())
    }

    /// Send one request and wait for its response data
    fn request(&mut self, request_type: &str, data: Value) -> Result<Value, MixerError> {
        self.next_request_id += 1;
        let request_id = self.next_request_id.to_string();
        let socket = self.socket()?;

        let mut payload = json!({
            "requestType": request_type,
            "requestId": request_id,
        });
        if !data.is_null() {
            payload["requestData"] = data;
        }
        send_frame(socket, OP_REQUEST, payload)?;

        loop {
            let frame = read_frame(socket)?;
            if frame.op != OP_REQUEST_RESPONSE {
                tracing::trace!("Skipping mixer frame with op {}", frame.op);
                continue;
            }
            let response: RequestResponse = serde_json::from_value(frame.d)
                .map_err(|e| MixerError::Protocol(format!("bad RequestResponse: {}", e)))?;
            if response.request_id != request_id {
                tracing::debug!("Skipping response for stale request {}", response.request_id);
                continue;
            }
            if !response.request_status.result {
                return Err(MixerError::RequestFailed {
                    request: request_type.to_string(),
                    code: response.request_status.code,
                    comment: response.request_status.comment.unwrap_or_default(),
                });
            }
            return Ok(response.response_data);
        }
    }

    fn request_as<T: for<'de> Deserialize<'de>>(
        &mut self,
        request_type: &str,
        data: Value,
    ) -> Result<T, MixerError> {
        let response = self.request(request_type, data)?;
        serde_json::from_value(response)
            .map_err(|e| MixerError::Protocol(format!("bad {} response: {}", request_type, e)))
    }
}

impl MixerClient for ObsClient {
    fn connect(&mut self) -> Result<(), MixerError> {
        if self.socket.is_some() {
            tracing::debug!("Dropping stale mixer connection before reconnecting");
            let _ = self.disconnect();
        }

        let url = self.settings.url();
        let (mut socket, _) =
            tungstenite::connect(url.as_str()).map_err(|e| MixerError::ConnectFailed {
                url: url.clone(),
                source: Box::new(e),
            })?;
        set_read_timeout(&mut socket, Some(self.timeout()));

        self.identify(&mut socket)?;
        tracing::debug!("Connected to mixer at {}", url);
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MixerError> {
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };

        match socket.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(MixerError::Transport(Box::new(e))),
        }
        // Drain until the server acknowledges the close frame
        loop {
            match socket.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                    break
                }
                Err(e) => {
                    tracing::debug!("Mixer close handshake ended early: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    fn list_scenes(&mut self) -> Result<Vec<String>, MixerError> {
        let list: SceneList = self.request_as("GetSceneList", Value::Null)?;
        Ok(list.scenes.into_iter().map(|s| s.scene_name).collect())
    }

    fn list_sources(&mut self) -> Result<Vec<String>, MixerError> {
        let list: InputList = self.request_as("GetInputList", Value::Null)?;
        Ok(list.inputs.into_iter().map(|i| i.input_name).collect())
    }

    fn set_current_scene(&mut self, scene: &str) -> Result<(), MixerError> {
        self.request("SetCurrentProgramScene", json!({ "sceneName": scene }))?;
        Ok(())
    }

    fn get_current_scene(&mut self) -> Result<String, MixerError> {
        let current: CurrentProgramScene = self.request_as("GetCurrentProgramScene", Value::Null)?;
        Ok(current.current_program_scene_name)
    }

    fn set_mute(&mut self, source: &str, muted: bool) -> Result<(), MixerError> {
        self.request(
            "SetInputMute",
            json!({ "inputName": source, "inputMuted": muted }),
        )?;
        Ok(())
    }

    fn get_mute(&mut self, source: &str) -> Result<bool, MixerError> {
        let mute: InputMute = self.request_as("GetInputMute", json!({ "inputName": source }))?;
        Ok(mute.input_muted)
    }

    fn set_text(&mut self, source: &str, text: &str) -> Result<(), MixerError> {
        self.request(
            "SetInputSettings",
            json!({ "inputName": source, "inputSettings": { "text": text }, "overlay": true }),
        )?;
        Ok(())
    }

    fn get_text(&mut self, source: &str) -> Result<String, MixerError> {
        let settings: InputSettings =
            self.request_as("GetInputSettings", json!({ "inputName": source }))?;
        Ok(settings.input_settings.text)
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn send_frame(socket: &mut Socket, op: u64, d: Value) -> Result<(), MixerError> {
    let raw = json!({ "op": op, "d": d }).to_string();
    socket
        .send(WsMessage::Text(raw.into()))
        .map_err(map_ws_error)
}

fn read_frame(socket: &mut Socket) -> Result<Frame, MixerError> {
    loop {
        let raw = match socket.read().map_err(map_ws_error)? {
            WsMessage::Text(text) => text.to_string(),
            WsMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            WsMessage::Close(frame) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                if code == Some(CLOSE_AUTHENTICATION_FAILED) {
                    return Err(MixerError::AuthenticationFailed);
                }
                let reason = frame
                    .map(|f| format!("closed by mixer ({}): {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "closed by mixer".to_string());
                return Err(MixerError::Transport(reason.into()));
            }
            _ => continue,
        };
        return parse_frame(&raw);
    }
}

fn parse_frame(raw: &str) -> Result<Frame, MixerError> {
    serde_json::from_str(raw).map_err(|e| MixerError::Protocol(format!("{}: {}", e, raw)))
}

fn map_ws_error(err: tungstenite::Error) -> MixerError {
    match err {
        tungstenite::Error::Io(io_err)
            if matches!(io_err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            MixerError::Timeout
        }
        other => MixerError::Transport(Box::new(other)),
    }
}

fn set_read_timeout(socket: &mut Socket, timeout: Option<Duration>) {
    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        let _ = stream.set_read_timeout(timeout);
        let _ = stream.set_write_timeout(timeout);
    }
}
