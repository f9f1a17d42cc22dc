//! Mixer control layer
//!
//! Handlers never hold a long-lived mixer session. Every command opens a fresh
//! connection, issues its calls and tears the connection down again:
//!
//! ```text
//! handler ──> session() ──> connect ──> call, call, ... ──> disconnect
//! ```
//!
//! Failures from any call propagate to the handler unchanged; the dispatcher
//! turns them into a failure reaction.

pub mod obs;
pub mod simulated;

pub use obs::ObsClient;
pub use simulated::{MixerCall, SimulatedMixer};

use crate::error::MixerError;

/// Request/response operations the command handlers need from the mixer
pub trait MixerClient: Send {
    fn connect(&mut self) -> Result<(), MixerError>;

    fn disconnect(&mut self) -> Result<(), MixerError>;

    /// Names of all scenes known to the mixer
    fn list_scenes(&mut self) -> Result<Vec<String>, MixerError>;

    /// Names of all inputs (audio and text sources) known to the mixer
    fn list_sources(&mut self) -> Result<Vec<String>, MixerError>;

    fn set_current_scene(&mut self, scene: &str) -> Result<(), MixerError>;

    fn get_current_scene(&mut self) -> Result<String, MixerError>;

    fn set_mute(&mut self, source: &str, muted: bool) -> Result<(), MixerError>;

    fn get_mute(&mut self, source: &str) -> Result<bool, MixerError>;

    fn set_text(&mut self, source: &str, text: &str) -> Result<(), MixerError>;

    fn get_text(&mut self, source: &str) -> Result<String, MixerError>;
}

impl<M: MixerClient + ?Sized> MixerClient for Box<M> {
    fn connect(&mut self) -> Result<(), MixerError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), MixerError> {
        (**self).disconnect()
    }

    fn list_scenes(&mut self) -> Result<Vec<String>, MixerError> {
        (**self).list_scenes()
    }

    fn list_sources(&mut self) -> Result<Vec<String>, MixerError> {
        (**self).list_sources()
    }

    fn set_current_scene(&mut self, scene: &str) -> Result<(), MixerError> {
        (**self).set_current_scene(scene)
    }

    fn get_current_scene(&mut self) -> Result<String, MixerError> {
        (**self).get_current_scene()
    }

    fn set_mute(&mut self, source: &str, muted: bool) -> Result<(), MixerError> {
        (**self).set_mute(source, muted)
    }

    fn get_mute(&mut self, source: &str) -> Result<bool, MixerError> {
        (**self).get_mute(source)
    }

    fn set_text(&mut self, source: &str, text: &str) -> Result<(), MixerError> {
        (**self).set_text(source, text)
    }

    fn get_text(&mut self, source: &str) -> Result<String, MixerError> {
        (**self).get_text(source)
    }
}

/// Run `work` inside a connect/disconnect pair.
///
/// The connection is closed even when `work` fails. A failed disconnect is
/// logged and otherwise ignored: by then the calls have either verified or
/// already produced an error of their own.
pub fn session<M, T, E>(mixer: &mut M, work: impl FnOnce(&mut M) -> Result<T, E>) -> Result<T, E>
where
    M: MixerClient + ?Sized,
    E: From<MixerError>,
{
    mixer.connect()?;
    let result = work(mixer);
    if let Err(e) = mixer.disconnect() {
        tracing::warn!("Mixer disconnect failed: {}", e);
    }
    result
}
