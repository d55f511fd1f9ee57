use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keypad_assistant::menu::MenuRegistry;
use keypad_assistant::runtime::{spawn_interrupt_handler, spawn_keypad};
use keypad_assistant::voice::{AudioRecorder, SAMPLE_RATE};
use keypad_assistant::{
    CommandSpeaker, Config, HttpRemoteClient, MicrophoneRecorder, RemoteClient, Runtime, Session,
    TerminalSink, parse_reply,
};

/// Keypad - keypad-driven voice assistant client
#[derive(Parser)]
#[command(name = "keypad", version, about)]
struct Cli {
    /// Assistant server base URL
    #[arg(long, env = "KEYPAD_SERVER_URL")]
    server_url: Option<String>,

    /// Start with speech output off
    #[arg(long)]
    no_tts: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and print the action menu
    Menu,
    /// Send one chat message and print the reply
    Ask {
        /// Message text
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,keypad_assistant=info",
        1 => "info,keypad_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    // stderr keeps logs out of the rendered screen
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.server_url {
        config.server.base_url = url;
    }
    if cli.no_tts {
        config.session.tts_enabled = false;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Menu => print_menu(&config).await,
            Command::Ask { text } => ask(&config, &text).await,
            Command::TestMic { duration } => test_mic(duration).await,
        };
    }

    tracing::info!(server = %config.server.base_url, "starting keypad assistant");

    let client = Arc::new(HttpRemoteClient::new(&config.server)?);
    let speaker = CommandSpeaker::new(config.speech.command.clone());
    let sink = TerminalSink::new(std::io::stdout(), Some(speaker));
    let session = Session::new(config.session);

    let runtime = Runtime::new(session, client, MicrophoneRecorder::new(), sink);
    let events = runtime.sender();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let _keypad = spawn_keypad(stdin, events.clone());
    let _interrupt = spawn_interrupt_handler(events);

    println!("Keys: 0-9 * #, b = back. Enter after each line.");
    runtime.run().await;

    Ok(())
}

/// Fetch the menu, falling back to the built-in one like the client does
async fn print_menu(config: &Config) -> anyhow::Result<()> {
    let client = HttpRemoteClient::new(&config.server)?;

    let registry = match client.fetch_menu().await {
        Ok(descriptor) => MenuRegistry::from_descriptor(descriptor),
        Err(failure) => {
            println!("(server unavailable: {failure}; showing default menu)\n");
            MenuRegistry::fallback()
        }
    };

    println!("{}", registry.render());
    Ok(())
}

/// One-shot chat
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = HttpRemoteClient::new(&config.server)?;

    let raw = client
        .chat(text)
        .await
        .map_err(|failure| anyhow::anyhow!("chat failed: {failure}"))?;
    let reply = parse_reply(&raw);

    println!("{}", reply.body);
    if !reply.options.is_empty() {
        println!("\n{}", reply.options.render());
    }
    Ok(())
}

/// Record for `duration` seconds and report what the microphone produced
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Recording for {duration} seconds at {SAMPLE_RATE} Hz, speak now...");

    let mut recorder = MicrophoneRecorder::new();
    let handle = recorder.start_capture()?;
    for elapsed in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!("[{elapsed:2}s]");
    }
    let wav = recorder.stop_capture(handle)?;

    println!("Captured {} WAV bytes", wav.len());
    if wav.is_empty() {
        println!("Nothing was captured. Check that a microphone is connected.");
    }

    Ok(())
}
