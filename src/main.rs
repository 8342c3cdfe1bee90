use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_duplex::audio::{
    create_output, AudioBackendConfig, AudioBackendFactory, AudioSink, AudioSource,
};
use voice_duplex::http::{create_router, shutdown_session, AppState, SessionTemplate};
use voice_duplex::session::{SessionConfig, SessionNotice, VoiceSession};
use voice_duplex::Config;

/// Full-duplex voice session with a remote assistant
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the local HTTP control API
    Serve {
        /// Config file (extension optional)
        #[arg(short, long, default_value = "config/voice-duplex")]
        config: String,

        /// Replay a WAV file instead of capturing from the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Start one session right away and run until Ctrl-C or disconnect
    Run {
        /// Assistant websocket URL
        #[arg(short, long)]
        url: String,

        /// Replay a WAV file instead of capturing from the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Discard reply audio instead of playing it
        #[arg(long)]
        mute: bool,
    },
}

fn audio_source(input: Option<PathBuf>) -> AudioSource {
    match input {
        Some(path) => AudioSource::File(path.to_string_lossy().into_owned()),
        None => AudioSource::Microphone,
    }
}

fn audio_sink(mute: bool, null_rate: u32) -> AudioSink {
    if mute || !cfg!(feature = "device") {
        AudioSink::Null { sample_rate: null_rate }
    } else {
        AudioSink::Speaker
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, input } => serve(&config, input).await,
        Commands::Run { url, input, mute } => run(url, input, mute).await,
    }
}

async fn serve(path: &str, input: Option<PathBuf>) -> Result<()> {
    let cfg = Config::load(path).with_context(|| format!("Failed to load config {}", path))?;

    info!("Voice Duplex v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Assistant: {}", cfg.assistant.url);

    let state = AppState::new(SessionTemplate {
        config: cfg.session_config(),
        source: audio_source(input),
        sink: audio_sink(false, cfg.audio.output_sample_rate),
        backend: AudioBackendConfig::default(),
    });

    let app = create_router(state.clone());
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    shutdown_session(&state).await;
    info!("Shut down");
    Ok(())
}

async fn run(url: String, input: Option<PathBuf>, mute: bool) -> Result<()> {
    let config = SessionConfig {
        assistant_url: url,
        ..SessionConfig::default()
    };

    let backend = AudioBackendFactory::create(audio_source(input), AudioBackendConfig::default())?;
    let output = create_output(&audio_sink(mute, 48_000))?;
    let session = VoiceSession::start(config, backend, output).await?;
    let mut notices = session.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            notice = notices.recv() => match notice {
                Ok(SessionNotice::Transcript(segment)) => {
                    println!("[{:?}] {}", segment.role, segment.text);
                }
                Ok(SessionNotice::Error(message)) => warn!("Assistant error: {}", message),
                Ok(SessionNotice::Closed { reason }) => {
                    info!("Session closed: {}", reason.unwrap_or_default());
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} session notices", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let stats = session.stop().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
