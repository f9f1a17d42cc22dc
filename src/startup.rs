//! Startup consistency check
//!
//! Connects once and confirms that every scene, microphone and text source
//! named in the config exists in the running mixer. Not repeated per command.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::StartupError;
use crate::mixer::{session, MixerClient};

/// Log target for everything that happens before the first message
pub const LOG_TARGET_STARTUP: &str = "obs_chat_remote::startup";

/// What the mixer reported during the startup check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerInventory {
    pub scenes: BTreeSet<String>,
    pub sources: BTreeSet<String>,
}

pub fn validate_mixer<M>(config: &Config, mixer: &mut M) -> Result<MixerInventory, StartupError>
where
    M: MixerClient + ?Sized,
{
    let inventory = session(mixer, |m| -> Result<MixerInventory, StartupError> {
        Ok(MixerInventory {
            scenes: m.list_scenes()?.into_iter().collect(),
            sources: m.list_sources()?.into_iter().collect(),
        })
    })?;

    tracing::info!(target: LOG_TARGET_STARTUP, "Mixer scenes: {:?}", inventory.scenes);
    tracing::info!(target: LOG_TARGET_STARTUP, "Mixer sources: {:?}", inventory.sources);

    let missing_scenes: Vec<String> = config
        .scenes
        .values()
        .filter(|scene| !inventory.scenes.contains(*scene))
        .cloned()
        .collect();

    let missing_sources: Vec<String> = config
        .remote_sources()
        .into_iter()
        .filter(|source| !inventory.sources.contains(*source))
        .map(str::to_string)
        .collect();

    if !missing_scenes.is_empty() || !missing_sources.is_empty() {
        return Err(StartupError::Missing {
            scenes: missing_scenes,
            sources: missing_sources,
        });
    }

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Verified {} scenes and {} sources",
        config.scenes.len(),
        config.remote_sources().len()
    );
    Ok(inventory)
}
