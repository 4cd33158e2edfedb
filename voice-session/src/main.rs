/// Voice session service binary
///
/// Standalone capture service that listens for the "hey johnny" trigger
/// and prints the finalized queries it hears.

use anyhow::Context;
use audio_ingest::{MockTranscriptionTransport, TranscriptEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use voice_session::{
    MicrophoneSource, PlaybackGate, SessionConfig, SessionEvent, SessionController, SessionStore,
    WavFileSource, DEFAULT_SESSION_TTL_SECS,
};

struct ServiceConfig {
    session: SessionConfig,
    session_ttl: Duration,
    input_wav: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_session=info".parse().unwrap())
                .add_directive("audio_ingest=info".parse().unwrap())
                .add_directive("wake_segmenter=info".parse().unwrap()),
        )
        .init();

    info!("Starting Stockvoice voice session service");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(SessionStore::new(config.session_ttl));
    let gate = PlaybackGate::new();

    // In production: connect the streaming transcription client here. The
    // scripted transport lets the service run end to end without one.
    let transport = Arc::new(demo_transport());

    let started = match &config.input_wav {
        Some(path) => {
            info!("Replaying WAV input from {:?}", path);
            match WavFileSource::open(path) {
                Ok(source) => {
                    SessionController::start(
                        config.session.clone(),
                        source,
                        transport,
                        gate.clone(),
                        store.clone(),
                    )
                    .await
                }
                Err(e) => {
                    error!("Failed to open WAV input: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => match MicrophoneSource::open() {
            Ok(source) => {
                SessionController::start(
                    config.session.clone(),
                    source,
                    transport,
                    gate.clone(),
                    store.clone(),
                )
                .await
            }
            Err(e) => {
                // Device taxonomy matters to the operator: a denied
                // permission needs a different fix than missing hardware
                error!("Failed to acquire capture device: {}", e);
                std::process::exit(1);
            }
        },
    };

    let (controller, mut events) = match started {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to start session: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Session {} running. Say {:?} followed by a question",
        controller.id(),
        config.session.trigger_phrase
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                controller.stop().await;
            }

            event = events.recv() => match event {
                Some(SessionEvent::WakeDetected { session }) => {
                    info!("Wake detected (session {})", session);
                }
                Some(SessionEvent::UtteranceFinalized { session, text }) => {
                    info!("Query (session {}): {:?}", session, text);

                    // In production: answer the query and synthesize speech.
                    // The gate stays muted for the playback window so the
                    // pipeline does not transcribe its own voice.
                    gate.mute();
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    gate.unmute();
                }
                Some(SessionEvent::Stopped { session, reason }) => {
                    info!("Session {} stopped: {:?}", session, reason);
                    break;
                }
                None => break,
            }
        }
    }

    info!("Voice session service stopped");
}

/// Load configuration from environment variables
fn load_config() -> anyhow::Result<ServiceConfig> {
    let mut session = SessionConfig::default();

    if let Ok(trigger) = std::env::var("VOICE_TRIGGER_PHRASE") {
        session.trigger_phrase = trigger;
    }

    if let Ok(raw) = std::env::var("VOICE_SILENCE_TIMEOUT_MS") {
        let ms: u64 = raw
            .parse()
            .context("VOICE_SILENCE_TIMEOUT_MS must be an integer")?;
        session.silence_timeout = Duration::from_millis(ms);
    }

    if let Ok(raw) = std::env::var("VOICE_POLL_INTERVAL_MS") {
        let ms: u64 = raw
            .parse()
            .context("VOICE_POLL_INTERVAL_MS must be an integer")?;
        session.poll_interval = Duration::from_millis(ms);
    }

    let session_ttl = match std::env::var("VOICE_SESSION_TTL_SECS") {
        Ok(raw) => Duration::from_secs(
            raw.parse()
                .context("VOICE_SESSION_TTL_SECS must be an integer")?,
        ),
        Err(_) => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
    };

    let input_wav = std::env::var("VOICE_INPUT_WAV").ok().map(PathBuf::from);

    Ok(ServiceConfig {
        session,
        session_ttl,
        input_wav,
    })
}

/// Scripted transport exercising the whole pipeline without a backend
fn demo_transport() -> MockTranscriptionTransport {
    let transport = MockTranscriptionTransport::new();

    transport.push_send_response(vec![TranscriptEvent::Partial {
        text: "hey johnny".to_string(),
        confidence: Some(0.92),
    }]);
    transport.push_send_response(vec![TranscriptEvent::Partial {
        text: "how many blue mugs".to_string(),
        confidence: Some(0.88),
    }]);
    transport.push_send_response(vec![TranscriptEvent::Final {
        text: "how many blue mugs are left".to_string(),
        confidence: Some(0.95),
    }]);

    transport
}
