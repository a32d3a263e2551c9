//! Jarvis binary: wires the producers, the worker, and the reply sinks.

use clap::Parser;
use jarvis::agent::AgentSession;
use jarvis::audio::{CaptureStop, FramedCapture, PcmPlayer, ThinkingBeep, ToneChime};
use jarvis::config::AssistantConfig;
use jarvis::input::voice::SpokenCancel;
use jarvis::input::{self, EarlyCancel};
use jarvis::pipeline::inbox;
use jarvis::pipeline::thinking::ThinkingIndicator;
use jarvis::stt::{PhraseFilter, WhisperTranscriber};
use jarvis::tts::OpenAiSpeech;
use jarvis::ui::TerminalDisplay;
use jarvis::{Router, Worker, WorkerExit, channels, restart};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Jarvis: talk to a command-line AI agent by voice, keyboard, or Matrix.
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start a new agent conversation instead of resuming the last one.
    #[arg(long)]
    fresh: bool,

    /// Disable microphone input.
    #[arg(long)]
    no_voice: bool,

    /// Disable keyboard input.
    #[arg(long)]
    no_keyboard: bool,

    /// Disable the Matrix chat bridge.
    #[arg(long)]
    no_chat: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    cli.apply_overrides(&mut config);
    let log_guard = jarvis::logging::init(&config.logging);
    config.validate()?;

    let exit = run(&cli, config).await?;
    if exit == WorkerExit::Restart {
        restart::exec(log_guard)?;
    }
    Ok(())
}

impl Cli {
    /// Switch off the inputs disabled on the command line, so validation
    /// only checks what will actually run.
    fn apply_overrides(&self, config: &mut AssistantConfig) {
        if self.no_voice {
            config.voice.enabled = false;
        }
        if self.no_keyboard {
            config.keyboard.enabled = false;
        }
        if self.no_chat {
            config.chat.enabled = false;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AssistantConfig> {
    if let Some(path) = path {
        return Ok(AssistantConfig::from_file(path)?);
    }
    let default_path = AssistantConfig::default_config_path();
    if default_path.exists() {
        Ok(AssistantConfig::from_file(&default_path)?)
    } else {
        Ok(AssistantConfig::default())
    }
}

async fn run(cli: &Cli, config: AssistantConfig) -> anyhow::Result<WorkerExit> {
    println!("Jarvis v{}", env!("CARGO_PKG_VERSION"));

    let agent = AgentSession::new(config.agent.clone(), !cli.fresh)?;
    let cancel = agent.cancel_handle();
    let early_cancel = EarlyCancel::new(config.commands.clone(), cancel.clone());
    let (inbox_tx, inbox) = inbox::channel();
    let (shutdown, shutdown_rx) = inbox::shutdown_channel();
    let display = Arc::new(TerminalDisplay::stdout("Jarvis"));

    // Sinks
    let player = if config.tts.enabled {
        Some(PcmPlayer::new(config.tts.player_command.clone())?)
    } else {
        None
    };
    let mut router = Router::new(display.clone()).with_chime(Box::new(ToneChime::new(
        player.clone(),
        config.tts.sample_rate,
    )));
    if config.tts.enabled {
        match OpenAiSpeech::from_env(&config.tts) {
            Ok(speech) => router = router.with_speaker(Box::new(speech)),
            Err(e) => warn!("speech output disabled: {e}"),
        }
    }

    // Producers
    let mut bridge = None;
    if config.chat.enabled {
        let (handle, outbox) =
            channels::start_bridge(config.chat.clone(), inbox_tx.clone(), early_cancel.clone())?;
        router = router.with_chat(Box::new(outbox));
        bridge = Some(handle);
        info!(room_id = %config.chat.room_id, "chat bridge started");
    }

    let mut capture_stop: Option<CaptureStop> = None;
    if config.voice.enabled {
        match FramedCapture::spawn(&config.voice.capture_command) {
            Ok(capture) => {
                capture_stop = Some(capture.stop_handle());
                let spoken_cancel = match WhisperTranscriber::from_env(&config.stt) {
                    Ok(stt) => Some(SpokenCancel::new(Box::new(stt), early_cancel.clone())),
                    Err(e) => {
                        warn!("spoken cancel disabled: {e}");
                        None
                    }
                };
                input::voice::spawn(
                    Box::new(capture),
                    inbox_tx.clone(),
                    config.voice.clone(),
                    spoken_cancel,
                )?;
            }
            Err(e) => warn!("voice input disabled: {e}"),
        }
    }

    if config.keyboard.enabled {
        input::keyboard::spawn(inbox_tx.clone(), early_cancel)?;
        println!("\nType a message and finish it with an empty line. ESC discards it.");
    }
    drop(inbox_tx);

    // Worker
    let mut thinking = ThinkingIndicator::new(Duration::from_secs(config.thinking.interval_secs))
        .with_heartbeat(display.clone());
    if let Some(player) = player {
        thinking = thinking.with_heartbeat(Arc::new(ThinkingBeep::new(player, config.tts.sample_rate)));
    }
    let mut worker = Worker::new(
        Box::new(agent),
        router,
        config.commands.clone(),
        config.replies.clone(),
    )
    .with_filter(Box::new(PhraseFilter::new(config.stt.filter_phrases.as_slice())?))
    .with_thinking(thinking);
    match WhisperTranscriber::from_env(&config.stt) {
        Ok(stt) => worker = worker.with_transcriber(Box::new(stt)),
        Err(e) => warn!("speech recognition disabled: {e}"),
    }

    println!("Ready. Press Ctrl+C to quit.\n");
    let mut worker_task = tokio::task::spawn_blocking(move || worker.run(&inbox, &shutdown_rx));
    let exit = tokio::select! {
        joined = &mut worker_task => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down...");
            shutdown.trigger();
            cancel.cancel();
            worker_task.await?
        }
    };

    if let Some(stop) = capture_stop {
        stop.stop();
    }
    if let Some(mut bridge) = bridge {
        tokio::task::spawn_blocking(move || bridge.stop()).await?;
    }
    info!(?exit, "jarvis stopped");
    Ok(exit)
}
