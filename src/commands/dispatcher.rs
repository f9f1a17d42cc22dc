use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::table::CommandTable;
use super::{handlers, Command, Outcome};
use crate::chat::{ChatTransport, InboundMessage, Reaction};
use crate::config::Config;
use crate::error::{ConfigError, TransportError};
use crate::mixer::MixerClient;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// Sender not allowed; nothing was sent
    Unauthorized,
    /// No binding matched; nothing was sent
    Unmatched,
    /// Handler ran to completion
    Handled(Command),
    /// Handler failed; a failure reaction was attached
    Failed(Command),
    /// Something outside the handler broke (delivery error or panic)
    Aborted,
}

/// Authorization, command lookup, handler invocation and delivery.
///
/// The mixer sits behind a mutex so that exactly one command at a time holds a
/// mixer connection, whichever thread dispatches it.
pub struct Dispatcher<M: MixerClient> {
    config: Arc<Config>,
    table: CommandTable,
    mixer: Mutex<M>,
}

impl<M: MixerClient> Dispatcher<M> {
    pub fn new(config: Arc<Config>, mixer: M) -> Result<Self, ConfigError> {
        let table = CommandTable::build(&config)?;
        tracing::info!("Command table ready with {} bindings", table.len());
        Ok(Self {
            config,
            table,
            mixer: Mutex::new(mixer),
        })
    }

    /// Direct access to the mixer, e.g. for inspection between messages
    pub fn mixer(&self) -> MutexGuard<'_, M> {
        self.mixer.lock()
    }

    /// Allow-list membership, plus the terminal-harness exception when test
    /// mode is switched on: the test sender with no message id.
    pub fn is_authorized(&self, message: &InboundMessage) -> bool {
        if self.config.is_authorized_sender(&message.sender) {
            return true;
        }
        let test_mode = &self.config.test_mode;
        test_mode.enabled && message.sender == test_mode.sender && message.id.is_none()
    }

    /// Process one message to completion. Never panics and never returns an
    /// error: whatever goes wrong is logged and reported in the result.
    pub fn dispatch(&self, message: &InboundMessage, transport: &dyn ChatTransport) -> DispatchReport {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(message, transport)));
        match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!("Failed to deliver response to {}: {:#}", message.sender, anyhow::Error::new(e));
                DispatchReport::Aborted
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Command processing panicked: {}", reason);
                DispatchReport::Aborted
            }
        }
    }

    fn process(
        &self,
        message: &InboundMessage,
        transport: &dyn ChatTransport,
    ) -> Result<DispatchReport, TransportError> {
        if !self.is_authorized(message) {
            tracing::debug!("Ignoring message from unauthorized sender {}", message.sender);
            return Ok(DispatchReport::Unauthorized);
        }

        let Some((binding, command)) = self.table.find(&message.content) else {
            tracing::trace!("No command matched message {:?}", message.id);
            return Ok(DispatchReport::Unmatched);
        };

        tracing::info!(
            "Running '{}' for {}: {}",
            binding.name(),
            message.sender,
            command.description()
        );
        tracing::debug!("Matched /{}/ in message {:?}", binding.pattern(), message.id);

        let result = {
            let mut mixer = self.mixer.lock();
            handlers::run(&mut *mixer, &self.config, &command)
        };

        match result {
            Ok(outcome) => {
                deliver(message, &outcome, transport)?;
                Ok(DispatchReport::Handled(command))
            }
            Err(e) => {
                tracing::error!(
                    "Command '{}' failed: {:#}",
                    command.description(),
                    anyhow::Error::new(e)
                );
                transport.react(message, Reaction::Failure)?;
                Ok(DispatchReport::Failed(command))
            }
        }
    }
}

/// Reaction first, then the reply if there is any text to send
fn deliver(
    message: &InboundMessage,
    outcome: &Outcome,
    transport: &dyn ChatTransport,
) -> Result<(), TransportError> {
    if let Some(reaction) = outcome.reaction {
        transport.react(message, reaction)?;
    }
    if let Some(text) = outcome.reply_text() {
        transport.send_reply(message, text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{MixerCall, SimulatedMixer};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail_delivery: bool,
    }

    impl ChatTransport for Recorder {
        fn send_reply(&self, _message: &InboundMessage, text: &str) -> Result<(), TransportError> {
            if self.fail_delivery {
                return Err(TransportError::Malformed("delivery down".to_string()));
            }
            self.sent.lock().push(format!("reply:{}", text));
            Ok(())
        }

        fn react(&self, _message: &InboundMessage, reaction: Reaction) -> Result<(), TransportError> {
            if self.fail_delivery {
                return Err(TransportError::Malformed("delivery down".to_string()));
            }
            self.sent.lock().push(format!("react:{}", reaction.emoji_name()));
            Ok(())
        }
    }

    /// Panics on every mixer call
    struct ExplodingMixer;

    impl MixerClient for ExplodingMixer {
        fn connect(&mut self) -> Result<(), crate::error::MixerError> {
            panic!("mixer exploded")
        }
        fn disconnect(&mut self) -> Result<(), crate::error::MixerError> {
            Ok(())
        }
        fn list_scenes(&mut self) -> Result<Vec<String>, crate::error::MixerError> {
            unreachable!()
        }
        fn list_sources(&mut self) -> Result<Vec<String>, crate::error::MixerError> {
            unreachable!()
        }
        fn set_current_scene(&mut self, _scene: &str) -> Result<(), crate::error::MixerError> {
            unreachable!()
        }
        fn get_current_scene(&mut self) -> Result<String, crate::error::MixerError> {
            unreachable!()
        }
        fn set_mute(&mut self, _source: &str, _muted: bool) -> Result<(), crate::error::MixerError> {
            unreachable!()
        }
        fn get_mute(&mut self, _source: &str) -> Result<bool, crate::error::MixerError> {
            unreachable!()
        }
        fn set_text(&mut self, _source: &str, _text: &str) -> Result<(), crate::error::MixerError> {
            unreachable!()
        }
        fn get_text(&mut self, _source: &str) -> Result<String, crate::error::MixerError> {
            unreachable!()
        }
    }

    const PRODUCER: &str = "producer@example.com";

    fn config() -> Arc<Config> {
        let mut config = Config::default();
        config.authorized_senders.insert(PRODUCER.to_string());
        Arc::new(config)
    }

    fn dispatcher() -> Dispatcher<SimulatedMixer> {
        let config = config();
        let mixer = SimulatedMixer::from_config(&config);
        Dispatcher::new(config, mixer).unwrap()
    }

    fn from_producer(content: &str) -> InboundMessage {
        InboundMessage::new(PRODUCER, content).with_id(1)
    }

    #[test]
    fn test_unauthorized_sender_is_ignored() {
        let dispatcher = dispatcher();
        let transport = Recorder::default();
        let message = InboundMessage::new("stranger@example.com", "mute").with_id(5);

        let report = dispatcher.dispatch(&message, &transport);

        assert_eq!(report, DispatchReport::Unauthorized);
        assert!(transport.sent.lock().is_empty());
        assert!(dispatcher.mixer().calls().is_empty());
    }

    #[test]
    fn test_test_sender_bypass_requires_test_mode() {
        let harness_message = InboundMessage::new(crate::config::DEFAULT_TEST_SENDER, "react");

        let dispatcher = dispatcher();
        assert!(!dispatcher.is_authorized(&harness_message));

        let mut config = (*config()).clone();
        config.test_mode.enabled = true;
        let dispatcher = Dispatcher::new(Arc::new(config), SimulatedMixer::new()).unwrap();
        assert!(dispatcher.is_authorized(&harness_message));

        // A real chat message always has an id
        assert!(!dispatcher.is_authorized(&harness_message.clone().with_id(3)));
    }

    #[test]
    fn test_unmatched_message_is_silent() {
        let dispatcher = dispatcher();
        let transport = Recorder::default();

        let report = dispatcher.dispatch(&from_producer("good morning"), &transport);

        assert_eq!(report, DispatchReport::Unmatched);
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_reply_delivered() {
        let dispatcher = dispatcher();
        let transport = Recorder::default();

        let report = dispatcher.dispatch(&from_producer("help"), &transport);

        assert_eq!(report, DispatchReport::Handled(Command::Help));
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("reply:* `switch [scene-name]`"));
    }

    #[test]
    fn test_handler_failure_reacts_once() {
        let dispatcher = dispatcher();
        let transport = Recorder::default();

        for _ in 0..3 {
            let report = dispatcher.dispatch(&from_producer("raise_exception"), &transport);
            assert_eq!(report, DispatchReport::Failed(Command::RaiseFailure));
        }

        assert_eq!(*transport.sent.lock(), vec!["react:boom"; 3]);
    }

    #[test]
    fn test_mixer_failure_becomes_failure_reaction() {
        let config = config();
        let mixer = SimulatedMixer::from_config(&config).offline();
        let dispatcher = Dispatcher::new(config, mixer).unwrap();
        let transport = Recorder::default();

        let report = dispatcher.dispatch(&from_producer("switch blank"), &transport);

        assert_eq!(
            report,
            DispatchReport::Failed(Command::Switch {
                scene: Some("blank".to_string())
            })
        );
        assert_eq!(*transport.sent.lock(), vec!["react:boom"]);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let dispatcher = Dispatcher::new(config(), ExplodingMixer).unwrap();
        let transport = Recorder::default();

        let report = dispatcher.dispatch(&from_producer("mute"), &transport);
        assert_eq!(report, DispatchReport::Aborted);

        // The dispatcher keeps working afterwards
        let report = dispatcher.dispatch(&from_producer("react"), &transport);
        assert_eq!(report, DispatchReport::Handled(Command::React));
        assert_eq!(*transport.sent.lock(), vec!["react:check_mark"]);
    }

    #[test]
    fn test_delivery_failure_is_contained() {
        let dispatcher = dispatcher();
        let transport = Recorder {
            fail_delivery: true,
            ..Recorder::default()
        };

        let report = dispatcher.dispatch(&from_producer("react"), &transport);
        assert_eq!(report, DispatchReport::Aborted);
    }

    #[test]
    fn test_first_match_fires_once() {
        let dispatcher = dispatcher();
        let transport = Recorder::default();

        // Matches both the explicit switch and, on the second line, the blank shortcut
        let report = dispatcher.dispatch(&from_producer("switch title\nblank"), &transport);

        assert_eq!(
            report,
            DispatchReport::Handled(Command::Switch {
                scene: Some("title".to_string())
            })
        );
        assert_eq!(
            dispatcher.mixer().requests(),
            vec![
                MixerCall::SetCurrentScene("Title card".to_string()),
                MixerCall::GetCurrentScene,
            ]
        );
        assert_eq!(*transport.sent.lock(), vec!["react:check_mark"]);
    }
}
