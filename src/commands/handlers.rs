//! Command handlers
//!
//! Every handler that touches the mixer writes first and then reads the state
//! back; the reaction reflects what the mixer reports afterwards, not whether
//! the write request was accepted.

use super::{Command, Outcome};
use crate::chat::Reaction;
use crate::config::Config;
use crate::error::HandlerError;
use crate::mixer::{session, MixerClient};

/// Run one parsed command against the mixer
pub fn run<M>(mixer: &mut M, config: &Config, command: &Command) -> Result<Outcome, HandlerError>
where
    M: MixerClient + ?Sized,
{
    match command {
        Command::Switch { scene } => switch(mixer, config, scene.as_deref()),
        Command::Help => Ok(Outcome::reply(help(config))),
        Command::Mute => mute(mixer, config, true),
        Command::Unmute => unmute(mixer, config),
        Command::React => Ok(react()),
        Command::RaiseFailure => raise_failure(),
        Command::Text { field, content } => text(mixer, config, field, content),
    }
}

/// Reply for `switch` without a usable scene name
pub fn switch_help(config: &Config) -> String {
    // BTreeMap keys are already sorted
    let scenes = config
        .scenes
        .keys()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(" ");
    format!("available scenes: {}\nswitch with `switch $NAME`", scenes)
}

pub fn switch<M>(mixer: &mut M, config: &Config, scene: Option<&str>) -> Result<Outcome, HandlerError>
where
    M: MixerClient + ?Sized,
{
    let Some(remote) = scene.and_then(|name| config.scenes.get(name)) else {
        return Ok(Outcome::reply(switch_help(config)));
    };

    let current = session(mixer, |m| -> Result<String, HandlerError> {
        m.set_current_scene(remote)?;
        Ok(m.get_current_scene()?)
    })?;

    if current == *remote {
        Ok(Outcome::react(Reaction::Success))
    } else {
        tracing::warn!("Requested scene '{}' but mixer reports '{}'", remote, current);
        if config.report_partial_failures {
            Ok(Outcome::reply(format!(
                "Scene is `{}`, expected `{}`",
                current, remote
            )))
        } else {
            Ok(Outcome::silent())
        }
    }
}

pub fn help(config: &Config) -> String {
    let scenes = backticked(config.scenes.keys());
    let texts = backticked(config.texts.keys());
    [
        "* `switch [scene-name]` or just `[scene-name]`: switch scene".to_string(),
        "* `text [text-item] [content]` or just `[text-item] [content]`: adjust text content"
            .to_string(),
        "* `mute`, `unmute`: mute or unmute the configured microphones".to_string(),
        format!("* scenes: {}", scenes),
        format!("* text-items: {}", texts),
        "* `help`".to_string(),
    ]
    .join("\n")
}

fn backticked<'a>(names: impl Iterator<Item = &'a String>) -> String {
    names
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Set every microphone to `muted`, then read every one back.
///
/// All muted -> muted reaction, none muted -> unmuted reaction, anything else
/// -> a status line so the operator sees which state each source is in.
pub fn mute<M>(mixer: &mut M, config: &Config, muted: bool) -> Result<Outcome, HandlerError>
where
    M: MixerClient + ?Sized,
{
    let statuses = session(mixer, |m| -> Result<Vec<bool>, HandlerError> {
        for mic in &config.microphones {
            m.set_mute(mic, muted)?;
        }
        let mut statuses = Vec::with_capacity(config.microphones.len());
        for mic in &config.microphones {
            statuses.push(m.get_mute(mic)?);
        }
        Ok(statuses)
    })?;

    tracing::debug!("Mute statuses after setting {}: {:?}", muted, statuses);

    if statuses.iter().all(|&s| s) {
        Ok(Outcome::react(Reaction::Muted))
    } else if statuses.iter().all(|&s| !s) {
        Ok(Outcome::react(Reaction::Unmuted))
    } else {
        Ok(Outcome::reply(mute_status_line(&statuses)))
    }
}

pub fn unmute<M>(mixer: &mut M, config: &Config) -> Result<Outcome, HandlerError>
where
    M: MixerClient + ?Sized,
{
    mute(mixer, config, false)
}

fn mute_status_line(statuses: &[bool]) -> String {
    let states = statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("Mute statuses: {}", states)
}

pub fn react() -> Outcome {
    Outcome::react(Reaction::Success)
}

pub fn raise_failure() -> Result<Outcome, HandlerError> {
    Err(HandlerError::Requested)
}

/// Replace the two-character sequence `\n` with a real line break
pub fn unescape_newlines(content: &str) -> String {
    content.replace("\\n", "\n")
}

/// Write `content` to every OBS text source bound to `field` and verify each.
pub fn text<M>(mixer: &mut M, config: &Config, field: &str, content: &str) -> Result<Outcome, HandlerError>
where
    M: MixerClient + ?Sized,
{
    let Some(sources) = config.texts.get(field) else {
        return Ok(Outcome::reply(format!(
            "unknown text item `{}`; available: {}",
            field,
            backticked(config.texts.keys())
        )));
    };

    let content = unescape_newlines(content.trim());

    let statuses = session(mixer, |m| -> Result<Vec<bool>, HandlerError> {
        let mut statuses = Vec::with_capacity(sources.len());
        for source in sources {
            m.set_text(source, &content)?;
            statuses.push(m.get_text(source)? == content);
        }
        Ok(statuses)
    })?;

    if statuses.iter().all(|&ok| ok) {
        return Ok(Outcome::react(Reaction::Success));
    }

    tracing::warn!("Text item '{}' did not verify: {:?}", field, statuses);
    if config.report_partial_failures {
        let states = sources
            .iter()
            .zip(&statuses)
            .map(|(source, ok)| format!("{}={}", source, ok))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Outcome::reply(format!("Text statuses: {}", states)))
    } else {
        Ok(Outcome::silent())
    }
}
