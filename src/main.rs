use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use sysinfo::System;

use obs_chat_remote::chat::{ChatTransport, MessageSource, TerminalTransport, ZulipTransport};
use obs_chat_remote::commands::{CommandExecutor, Dispatcher};
use obs_chat_remote::config::Config;
use obs_chat_remote::error::AppResult;
use obs_chat_remote::mixer::{MixerClient, ObsClient, SimulatedMixer};
use obs_chat_remote::startup::{validate_mixer, LOG_TARGET_STARTUP};

const USAGE: &str = "usage: obs-chat-remote [CONFIG] [--terminal] [--simulate] [--check]";

/// Command-line switches
#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    /// Read commands from stdin as the test sender
    terminal: bool,
    /// Use the in-memory mixer instead of OBS
    simulate: bool,
    /// Validate the mixer against the config and exit
    check: bool,
}

impl Options {
    fn parse(args: impl Iterator<Item = String>) -> AppResult<Self> {
        let mut options = Options::default();
        for arg in args {
            match arg.as_str() {
                "--terminal" => options.terminal = true,
                "--simulate" => options.simulate = true,
                "--check" => options.check = true,
                "-h" | "--help" => {
                    println!("{}", USAGE);
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => bail!("unknown option '{}'\n{}", flag, USAGE),
                path => {
                    if options.config_path.is_some() {
                        bail!("more than one config path given\n{}", USAGE);
                    }
                    options.config_path = Some(PathBuf::from(path));
                }
            }
        }
        Ok(options)
    }
}

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/ObsChatRemote/logs/obs-chat-remote.YYYY-MM-DD.log`.
/// Debug builds also log to stderr, which keeps stdout free for the terminal
/// transport.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("ObsChatRemote").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "obs-chat-remote.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let host = System::host_name().unwrap_or_else(|| "unknown host".to_string());

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Starting OBS Chat Remote v{} on {} ({})",
        version,
        host,
        std::env::consts::ARCH
    );
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
}

fn build_mixer(config: &Config, simulate: bool) -> Box<dyn MixerClient> {
    if simulate {
        tracing::info!(target: LOG_TARGET_STARTUP, "Using simulated mixer");
        Box::new(SimulatedMixer::from_config(config))
    } else {
        tracing::info!(target: LOG_TARGET_STARTUP, "Using OBS at {}", config.mixer.url());
        Box::new(ObsClient::new(config.mixer.clone()))
    }
}

fn run(options: Options) -> AppResult<()> {
    let mut config = Config::load(options.config_path.as_deref()).context("Failed to load configuration")?;
    if options.terminal {
        config.test_mode.enabled = true;
    }
    let config = Arc::new(config);

    let mut mixer = build_mixer(&config, options.simulate);
    let inventory = validate_mixer(&config, &mut mixer).context("Startup validation failed")?;
    if options.check {
        println!(
            "OK: {} scenes and {} sources available, all configured items present",
            inventory.scenes.len(),
            inventory.sources.len()
        );
        return Ok(());
    }

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&config), mixer).context("Failed to build command table")?);

    let transport: Arc<dyn ChatTransport>;
    let source: Arc<dyn MessageSource>;
    if options.terminal {
        let terminal = Arc::new(TerminalTransport::stdio(&config.test_mode.sender));
        transport = terminal.clone();
        source = terminal;
    } else {
        let Some(settings) = config.zulip.clone() else {
            bail!("No zulip section in the configuration; add one or run with --terminal");
        };
        let zulip = Arc::new(ZulipTransport::new(settings));
        transport = zulip.clone();
        source = zulip;
    }

    let executor = CommandExecutor::new(dispatcher, transport);
    let worker = executor.start_processing();

    let listened = source.listen(&executor.sender());
    executor.shutdown();
    let stats = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Command executor thread panicked"))?;
    tracing::info!(
        "Processed {} messages ({} handled, {} failed)",
        stats.received,
        stats.handled,
        stats.failed
    );

    listened.context("Chat listener stopped")?;
    Ok(())
}

fn main() {
    initialize_tracing();
    log_runtime_environment();

    let result = Options::parse(std::env::args().skip(1)).and_then(run);
    if let Err(e) = result {
        tracing::error!(target: LOG_TARGET_STARTUP, "{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
