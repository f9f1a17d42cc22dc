use regex::{Captures, Regex, RegexBuilder};

use super::Command;
use crate::config::Config;
use crate::error::ConfigError;

/// What a binding does once its pattern matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// `switch <scene>`; the scene is capture group 1
    Switch,
    /// Scene shortcut with the scene name pre-bound
    SwitchTo(String),
    Help,
    Mute,
    Unmute,
    React,
    /// `text <field> <content>`; groups 1 and 2
    Text,
    /// Text shortcut with the field pre-bound; content is group 1
    TextTo(String),
    RaiseFailure,
}

impl CommandKind {
    /// Build the concrete command from the pattern's capture groups
    pub fn bind(&self, captures: &Captures<'_>) -> Command {
        let group = |index: usize| captures.get(index).map_or("", |m| m.as_str());

        match self {
            CommandKind::Switch => {
                let scene = group(1).trim();
                Command::Switch {
                    scene: (!scene.is_empty()).then(|| scene.to_string()),
                }
            }
            CommandKind::SwitchTo(scene) => Command::Switch {
                scene: Some(scene.clone()),
            },
            CommandKind::Help => Command::Help,
            CommandKind::Mute => Command::Mute,
            CommandKind::Unmute => Command::Unmute,
            CommandKind::React => Command::React,
            CommandKind::Text => Command::Text {
                field: group(1).to_string(),
                content: group(2).to_string(),
            },
            CommandKind::TextTo(field) => Command::Text {
                field: field.clone(),
                content: group(1).to_string(),
            },
            CommandKind::RaiseFailure => Command::RaiseFailure,
        }
    }
}

/// One pattern -> command binding
#[derive(Debug, Clone)]
pub struct Binding {
    name: String,
    pattern: Regex,
    kind: CommandKind,
}

impl Binding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }
}

/// Ordered, immutable set of command bindings.
///
/// Every pattern is anchored with `^`, case-insensitive and multi-line, and is
/// searched for anywhere in the message (so `^` also matches after a newline).
/// The first binding in registration order that matches wins.
#[derive(Debug, Clone)]
pub struct CommandTable {
    bindings: Vec<Binding>,
}

impl CommandTable {
    /// Explicit commands first, then one shortcut per scene and per text item.
    /// The order makes `switch <name>` win over a scene named `switch`.
    pub fn build(config: &Config) -> Result<Self, ConfigError> {
        let mut builder = CommandTableBuilder::default();

        builder.register("switch", r"^(?:switch)\s*(.*)", CommandKind::Switch)?;
        builder.register("help", r"^help\s*", CommandKind::Help)?;
        builder.register("mute", r"^mute\s*", CommandKind::Mute)?;
        builder.register("unmute", r"^unmute\s*", CommandKind::Unmute)?;
        builder.register("react", r"^react\s*", CommandKind::React)?;
        // Content may span lines
        builder.register_dotall("text", r"^text\s+(\S+)\s+(.*)", CommandKind::Text)?;
        builder.register("raise_exception", r"^raise_exception\s*", CommandKind::RaiseFailure)?;

        for scene in config.scenes.keys() {
            builder.register(
                scene,
                &format!(r"^{}\s*", regex::escape(scene)),
                CommandKind::SwitchTo(scene.clone()),
            )?;
        }

        for field in config.texts.keys() {
            builder.register(
                field,
                &format!(r"^{}\s+(.*)", regex::escape(field)),
                CommandKind::TextTo(field.clone()),
            )?;
        }

        Ok(builder.finish())
    }

    /// First binding matching `text`, with its command
    pub fn find(&self, text: &str) -> Option<(&Binding, Command)> {
        self.bindings.iter().find_map(|binding| {
            binding
                .pattern
                .captures(text)
                .map(|captures| (binding, binding.kind.bind(&captures)))
        })
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Default)]
struct CommandTableBuilder {
    bindings: Vec<Binding>,
}

impl CommandTableBuilder {
    fn register(&mut self, name: &str, pattern: &str, kind: CommandKind) -> Result<(), ConfigError> {
        self.push(name, compile(pattern, false)?, kind);
        Ok(())
    }

    fn register_dotall(
        &mut self,
        name: &str,
        pattern: &str,
        kind: CommandKind,
    ) -> Result<(), ConfigError> {
        self.push(name, compile(pattern, true)?, kind);
        Ok(())
    }

    fn push(&mut self, name: &str, pattern: Regex, kind: CommandKind) {
        tracing::debug!("Registered command '{}' as /{}/", name, pattern.as_str());
        self.bindings.push(Binding {
            name: name.to_string(),
            pattern,
            kind,
        });
    }

    fn finish(self) -> CommandTable {
        CommandTable {
            bindings: self.bindings,
        }
    }
}

fn compile(pattern: &str, dot_matches_new_line: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(dot_matches_new_line)
        .build()
}
