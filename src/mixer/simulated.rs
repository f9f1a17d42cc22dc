//! In-memory mixer
//!
//! Behaves like a small OBS instance: a scene list, a current program scene and
//! a set of inputs carrying a mute flag and text. Every call is recorded so the
//! exact request sequence of a command can be inspected. Inputs and the scene
//! switcher can be "stuck" to reproduce a mixer that accepts a request without
//! applying it.

use std::collections::{BTreeMap, BTreeSet};

use super::MixerClient;
use crate::config::Config;
use crate::error::MixerError;

/// One recorded mixer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerCall {
    Connect,
    Disconnect,
    ListScenes,
    ListSources,
    SetCurrentScene(String),
    GetCurrentScene,
    SetMute(String, bool),
    GetMute(String),
    SetText(String, String),
    GetText(String),
}

impl MixerCall {
    /// True for everything except connect/disconnect
    pub fn is_request(&self) -> bool {
        !matches!(self, MixerCall::Connect | MixerCall::Disconnect)
    }
}

#[derive(Debug, Clone, Default)]
struct Input {
    muted: bool,
    text: String,
}

#[derive(Debug, Default)]
pub struct SimulatedMixer {
    scenes: Vec<String>,
    current_scene: String,
    inputs: BTreeMap<String, Input>,
    stuck_inputs: BTreeSet<String>,
    scene_stuck: bool,
    offline: bool,
    failing: bool,
    connected: bool,
    calls: Vec<MixerCall>,
}

impl SimulatedMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mixer that already contains everything the config refers to
    pub fn from_config(config: &Config) -> Self {
        let mut mixer = Self::new();
        for scene in config.scenes.values() {
            mixer = mixer.with_scene(scene);
        }
        for source in config.remote_sources() {
            mixer = mixer.with_input(source);
        }
        mixer
    }

    pub fn with_scene(mut self, name: &str) -> Self {
        if !self.scenes.iter().any(|s| s == name) {
            self.scenes.push(name.to_string());
        }
        if self.current_scene.is_empty() {
            self.current_scene = name.to_string();
        }
        self
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.inputs.entry(name.to_string()).or_default();
        self
    }

    pub fn with_muted_input(mut self, name: &str, muted: bool) -> Self {
        self.inputs.entry(name.to_string()).or_default().muted = muted;
        self
    }

    /// The input keeps its current mute flag and text whatever is requested
    pub fn with_stuck_input(mut self, name: &str) -> Self {
        self.inputs.entry(name.to_string()).or_default();
        self.stuck_inputs.insert(name.to_string());
        self
    }

    /// Scene change requests succeed but the program scene never changes
    pub fn with_stuck_scene(mut self) -> Self {
        self.scene_stuck = true;
        self
    }

    /// Every connection attempt fails
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Connections succeed but every request fails
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> &[MixerCall] {
        &self.calls
    }

    /// Calls excluding connect/disconnect
    pub fn requests(&self) -> Vec<MixerCall> {
        self.calls.iter().filter(|c| c.is_request()).cloned().collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn current_scene(&self) -> &str {
        &self.current_scene
    }

    pub fn is_muted(&self, source: &str) -> Option<bool> {
        self.inputs.get(source).map(|input| input.muted)
    }

    pub fn text(&self, source: &str) -> Option<&str> {
        self.inputs.get(source).map(|input| input.text.as_str())
    }

    fn request(&mut self, call: MixerCall) -> Result<(), MixerError> {
        let request = format!("{:?}", call);
        self.calls.push(call);
        if !self.connected {
            return Err(MixerError::NotConnected);
        }
        if self.failing {
            return Err(MixerError::RequestFailed {
                request,
                code: 500,
                comment: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn input_mut(&mut self, source: &str, request: &str) -> Result<&mut Input, MixerError> {
        self.inputs.get_mut(source).ok_or_else(|| not_found(request, source))
    }
}

fn not_found(request: &str, name: &str) -> MixerError {
    MixerError::RequestFailed {
        request: request.to_string(),
        code: 600,
        comment: format!("No source was found by the name of `{}`.", name),
    }
}

impl MixerClient for SimulatedMixer {
    fn connect(&mut self) -> Result<(), MixerError> {
        self.calls.push(MixerCall::Connect);
        if self.offline {
            return Err(MixerError::ConnectFailed {
                url: "simulated://mixer".to_string(),
                source: "mixer is offline".into(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MixerError> {
        self.calls.push(MixerCall::Disconnect);
        self.connected = false;
        Ok(())
    }

    fn list_scenes(&mut self) -> Result<Vec<String>, MixerError> {
        self.request(MixerCall::ListScenes)?;
        Ok(self.scenes.clone())
    }

    fn list_sources(&mut self) -> Result<Vec<String>, MixerError> {
        self.request(MixerCall::ListSources)?;
        Ok(self.inputs.keys().cloned().collect())
    }

    fn set_current_scene(&mut self, scene: &str) -> Result<(), MixerError> {
        self.request(MixerCall::SetCurrentScene(scene.to_string()))?;
        if !self.scenes.iter().any(|s| s == scene) {
            return Err(not_found("SetCurrentProgramScene", scene));
        }
        if !self.scene_stuck {
            self.current_scene = scene.to_string();
        }
        Ok(())
    }

    fn get_current_scene(&mut self) -> Result<String, MixerError> {
        self.request(MixerCall::GetCurrentScene)?;
        Ok(self.current_scene.clone())
    }

    fn set_mute(&mut self, source: &str, muted: bool) -> Result<(), MixerError> {
        self.request(MixerCall::SetMute(source.to_string(), muted))?;
        let stuck = self.stuck_inputs.contains(source);
        let input = self.input_mut(source, "SetInputMute")?;
        if !stuck {
            input.muted = muted;
        }
        Ok(())
    }

    fn get_mute(&mut self, source: &str) -> Result<bool, MixerError> {
        self.request(MixerCall::GetMute(source.to_string()))?;
        Ok(self.input_mut(source, "GetInputMute")?.muted)
    }

    fn set_text(&mut self, source: &str, text: &str) -> Result<(), MixerError> {
        self.request(MixerCall::SetText(source.to_string(), text.to_string()))?;
        let stuck = self.stuck_inputs.contains(source);
        let input = self.input_mut(source, "SetInputSettings")?;
        if !stuck {
            input.text = text.to_string();
        }
        Ok(())
    }

    fn get_text(&mut self, source: &str) -> Result<String, MixerError> {
        self.request(MixerCall::GetText(source.to_string()))?;
        Ok(self.input_mut(source, "GetInputSettings")?.text.clone())
    }
}
