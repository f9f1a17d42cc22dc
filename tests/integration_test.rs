// Integration tests for OBS Chat Remote
// These drive the public API end to end: config -> command table -> dispatcher
// -> simulated mixer -> recording transport.

use std::sync::Arc;

use parking_lot::Mutex;

use obs_chat_remote::chat::{ChatTransport, InboundMessage, Reaction};
use obs_chat_remote::commands::{Command, CommandExecutor, DispatchReport, Dispatcher};
use obs_chat_remote::config::{Config, DEFAULT_TEST_SENDER};
use obs_chat_remote::error::TransportError;
use obs_chat_remote::mixer::{MixerCall, SimulatedMixer};
use obs_chat_remote::startup::validate_mixer;

const PRODUCER: &str = "producer@example.com";

/// Everything the bot sent, in order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Reply(String),
    React(Reaction),
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl ChatTransport for RecordingTransport {
    fn send_reply(&self, _message: &InboundMessage, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push(Sent::Reply(text.to_string()));
        Ok(())
    }

    fn react(&self, _message: &InboundMessage, reaction: Reaction) -> Result<(), TransportError> {
        self.sent.lock().push(Sent::React(reaction));
        Ok(())
    }
}

fn config() -> Config {
    Config::from_json(
        r#"{
            "authorized_senders": ["producer@example.com"],
            "microphones": ["Mic A", "Mic B"],
            "scenes": { "blank": "Empty", "title": "Title card" },
            "texts": { "front": ["Timing text", "Lower third"] }
        }"#,
    )
    .expect("valid test config")
}

fn dispatcher_with(config: Config, mixer: SimulatedMixer) -> Dispatcher<SimulatedMixer> {
    Dispatcher::new(Arc::new(config), mixer).expect("command table builds")
}

fn dispatcher() -> Dispatcher<SimulatedMixer> {
    let config = config();
    let mixer = SimulatedMixer::from_config(&config);
    dispatcher_with(config, mixer)
}

fn from_producer(content: &str) -> InboundMessage {
    InboundMessage::new(PRODUCER, content).with_id(42)
}

#[test]
fn test_unauthorized_sender_gets_nothing() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    for content in ["switch blank", "mute", "raise_exception", "help", "front hi"] {
        let message = InboundMessage::new("stranger@example.com", content).with_id(7);
        assert_eq!(dispatcher.dispatch(&message, &transport), DispatchReport::Unauthorized);
    }

    // The test sender without test mode is just another stranger
    let harness = InboundMessage::new(DEFAULT_TEST_SENDER, "react");
    assert_eq!(dispatcher.dispatch(&harness, &transport), DispatchReport::Unauthorized);

    assert!(transport.take().is_empty());
    assert!(dispatcher.mixer().calls().is_empty());
}

#[test]
fn test_first_registered_match_fires_once() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    // `help` is registered before the `title` shortcut
    let report = dispatcher.dispatch(&from_producer("help\ntitle"), &transport);

    assert_eq!(report, DispatchReport::Handled(Command::Help));
    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Sent::Reply(text) if text.contains("* scenes: `blank`, `title`")));
    assert!(dispatcher.mixer().calls().is_empty());
}

#[test]
fn test_switch_blank_sets_then_reads_back() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    dispatcher.dispatch(&from_producer("switch blank"), &transport);

    assert_eq!(
        dispatcher.mixer().calls(),
        &[
            MixerCall::Connect,
            MixerCall::SetCurrentScene("Empty".to_string()),
            MixerCall::GetCurrentScene,
            MixerCall::Disconnect,
        ]
    );
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Success)]);
}

#[test]
fn test_scene_shortcut_matches_switch() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    dispatcher.dispatch(&from_producer("title"), &transport);

    assert_eq!(dispatcher.mixer().current_scene(), "Title card");
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Success)]);
}

#[test]
fn test_switch_unknown_scene_replies_with_help() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    dispatcher.dispatch(&from_producer("switch nope"), &transport);

    assert_eq!(
        transport.take(),
        vec![Sent::Reply(
            "available scenes: `blank` `title`\nswitch with `switch $NAME`".to_string()
        )]
    );
    assert!(dispatcher.mixer().calls().is_empty());
}

#[test]
fn test_unmute_is_mute_false() {
    let config = config();

    let unmute = dispatcher_with(config.clone(), SimulatedMixer::from_config(&config));
    let transport = RecordingTransport::default();
    unmute.dispatch(&from_producer("unmute"), &transport);
    let unmute_sent = transport.take();

    let mut mute_false = SimulatedMixer::from_config(&config);
    let outcome = obs_chat_remote::commands::handlers::mute(&mut mute_false, &config, false)
        .expect("mute(false) succeeds");

    assert_eq!(unmute.mixer().calls(), mute_false.calls());
    assert_eq!(unmute_sent, vec![Sent::React(Reaction::Unmuted)]);
    assert_eq!(outcome.reaction, Some(Reaction::Unmuted));
}

#[test]
fn test_mute_reactions_all_none_mixed() {
    let config = config();
    let transport = RecordingTransport::default();

    // All follow the request
    let dispatcher = dispatcher_with(config.clone(), SimulatedMixer::from_config(&config));
    dispatcher.dispatch(&from_producer("mute"), &transport);
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Muted)]);
    dispatcher.dispatch(&from_producer("unmute"), &transport);
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Unmuted)]);

    // Mic B stays muted whatever is asked
    let mixer = SimulatedMixer::from_config(&config)
        .with_muted_input("Mic B", true)
        .with_stuck_input("Mic B");
    let dispatcher = dispatcher_with(config.clone(), mixer);
    dispatcher.dispatch(&from_producer("unmute"), &transport);
    assert_eq!(
        transport.take(),
        vec![Sent::Reply("Mute statuses: false true".to_string())]
    );

    // Every microphone stays muted, so unmute reports them all muted
    let mixer = SimulatedMixer::from_config(&config)
        .with_muted_input("Mic A", true)
        .with_stuck_input("Mic A")
        .with_muted_input("Mic B", true)
        .with_stuck_input("Mic B");
    let dispatcher = dispatcher_with(config, mixer);
    dispatcher.dispatch(&from_producer("unmute"), &transport);
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Muted)]);
}

#[test]
fn test_text_escaped_newline_reaches_every_source() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    dispatcher.dispatch(&from_producer(r"text front line1\nline2"), &transport);

    {
        let mixer = dispatcher.mixer();
        assert_eq!(mixer.text("Timing text"), Some("line1\nline2"));
        assert_eq!(mixer.text("Lower third"), Some("line1\nline2"));
    }
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Success)]);

    // The shortcut form behaves the same
    dispatcher.dispatch(&from_producer("front Round 2"), &transport);
    assert_eq!(dispatcher.mixer().text("Lower third"), Some("Round 2"));
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Success)]);
}

#[test]
fn test_text_single_mismatch_withholds_success() {
    let config = config();
    let mixer = SimulatedMixer::from_config(&config).with_stuck_input("Lower third");
    let dispatcher = dispatcher_with(config.clone(), mixer);
    let transport = RecordingTransport::default();

    dispatcher.dispatch(&from_producer("front hello"), &transport);
    assert!(transport.take().is_empty());

    let mut reporting = config.clone();
    reporting.report_partial_failures = true;
    let mixer = SimulatedMixer::from_config(&config).with_stuck_input("Lower third");
    let dispatcher = dispatcher_with(reporting, mixer);

    dispatcher.dispatch(&from_producer("front hello"), &transport);
    assert_eq!(
        transport.take(),
        vec![Sent::Reply(
            "Text statuses: Timing text=true Lower third=false".to_string()
        )]
    );
}

#[test]
fn test_raise_exception_fails_every_time() {
    let dispatcher = dispatcher();
    let transport = RecordingTransport::default();

    for _ in 0..3 {
        let report = dispatcher.dispatch(&from_producer("raise_exception"), &transport);
        assert_eq!(report, DispatchReport::Failed(Command::RaiseFailure));
        assert_eq!(transport.take(), vec![Sent::React(Reaction::Failure)]);
    }

    // Still serving afterwards
    dispatcher.dispatch(&from_producer("react"), &transport);
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Success)]);
}

#[test]
fn test_unreachable_mixer_reports_failure() {
    let config = config();
    let mixer = SimulatedMixer::from_config(&config).offline();
    let dispatcher = dispatcher_with(config, mixer);
    let transport = RecordingTransport::default();

    let report = dispatcher.dispatch(&from_producer("mute"), &transport);

    assert_eq!(report, DispatchReport::Failed(Command::Mute));
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Failure)]);
}

#[test]
fn test_terminal_harness_in_test_mode() {
    let mut config = config();
    config.test_mode.enabled = true;
    let mixer = SimulatedMixer::from_config(&config);
    let dispatcher = dispatcher_with(config, mixer);
    let transport = RecordingTransport::default();

    let harness = InboundMessage::new(DEFAULT_TEST_SENDER, "mute");
    assert_eq!(
        dispatcher.dispatch(&harness, &transport),
        DispatchReport::Handled(Command::Mute)
    );
    assert_eq!(transport.take(), vec![Sent::React(Reaction::Muted)]);
}

#[test]
fn test_startup_then_executor_pipeline() {
    let config = config();
    let mut mixer = SimulatedMixer::from_config(&config);
    validate_mixer(&config, &mut mixer).expect("mixer has every configured item");
    mixer.clear_calls();

    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Arc::new(dispatcher_with(config, mixer));
    let executor = CommandExecutor::new(Arc::clone(&dispatcher), transport.clone());
    let worker = executor.start_processing();

    executor.execute(from_producer("blank"));
    executor.execute(from_producer("mute"));
    executor.execute(from_producer("unrelated chatter"));
    executor.shutdown();

    let stats = worker.join().expect("executor thread");
    assert_eq!(stats.received, 3);
    assert_eq!(stats.handled, 2);
    assert_eq!(
        transport.take(),
        vec![Sent::React(Reaction::Success), Sent::React(Reaction::Muted)]
    );
    assert_eq!(dispatcher.mixer().current_scene(), "Empty");
}
