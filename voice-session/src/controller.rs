/// Session controller module
///
/// Owns one capture lifecycle: frames flow through the resampler and chunk
/// assembler into the dispatcher while transcript events drive the
/// segmenter, all on a single cooperative select loop. Stopping tears down
/// in reverse dependency order and is idempotent.

use crate::capture::{CaptureError, CaptureSource};
use crate::gate::PlaybackGate;
use crate::store::{SessionId, SessionStore};
use audio_ingest::{
    ChunkAssembler, ChunkDispatcher, DispatchError, DispatcherConfig, LinearResampler,
    ResampleError, TranscriptEvent, TranscriptionTransport,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wake_segmenter::{
    SegmenterConfig, SegmenterError, SegmenterEvent, UtteranceSegmenter, WAKE_WINDOW_CHARS,
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Resampler error: {0}")]
    Resample(#[from] ResampleError),

    #[error("Segmenter error: {0}")]
    Segmenter(#[from] SegmenterError),

    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatchError),
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The owner asked for teardown
    Requested,

    /// The transcription transport failed terminally
    TransportFailed(String),
}

/// Notification surfaced to the session owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Trigger phrase heard; the user is speaking a query
    WakeDetected { session: SessionId },

    /// A finished query, correlated by session id
    UtteranceFinalized { session: SessionId, text: String },

    /// The session ended; emitted exactly once
    Stopped { session: SessionId, reason: StopReason },
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Trigger phrase handed to the segmenter
    pub trigger_phrase: String,

    /// Silence duration that finalizes an utterance
    pub silence_timeout: Duration,

    /// Transcript poll interval for the dispatcher
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trigger_phrase: wake_segmenter::DEFAULT_TRIGGER_PHRASE.to_string(),
            silence_timeout: Duration::from_millis(wake_segmenter::DEFAULT_SILENCE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(audio_ingest::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Handle to a running capture session
///
/// Construction consumes the capture source, so a double start is
/// impossible by shape; `stop` may be called any number of times.
pub struct SessionController {
    id: SessionId,
    stop_requested: AtomicBool,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// Start a session over an acquired capture source
    ///
    /// Any failure here releases the source and leaves no transport, task
    /// or timer behind.
    pub async fn start<S>(
        config: SessionConfig,
        source: S,
        transport: Arc<dyn TranscriptionTransport>,
        gate: PlaybackGate,
        store: Arc<SessionStore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError>
    where
        S: CaptureSource + 'static,
    {
        let mut source = source;

        let resampler = match LinearResampler::new(source.sample_rate()) {
            Ok(resampler) => resampler,
            Err(e) => {
                source.stop();
                return Err(e.into());
            }
        };

        let segmenter_config = SegmenterConfig {
            trigger_phrase: config.trigger_phrase.clone(),
            silence_timeout: config.silence_timeout,
            wake_window_chars: WAKE_WINDOW_CHARS,
        };
        let (segmenter, seg_events) = match UtteranceSegmenter::new(segmenter_config) {
            Ok(pair) => pair,
            Err(e) => {
                source.stop();
                return Err(e.into());
            }
        };

        let dispatcher_config = DispatcherConfig {
            poll_interval: config.poll_interval,
        };
        let (dispatcher, transcripts) = match ChunkDispatcher::new(transport, dispatcher_config) {
            Ok(pair) => pair,
            Err(e) => {
                source.stop();
                return Err(e.into());
            }
        };

        let id = store.allocate();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            "Session {} started ({} Hz capture, trigger {:?})",
            id,
            source.sample_rate(),
            config.trigger_phrase
        );

        let task = tokio::spawn(run_loop(
            id,
            source,
            resampler,
            ChunkAssembler::new(),
            dispatcher,
            transcripts,
            segmenter,
            seg_events,
            gate,
            events_tx,
            stop_rx,
            store,
        ));

        Ok((
            Self {
                id,
                stop_requested: AtomicBool::new(false),
                stop_tx,
                task: Mutex::new(Some(task)),
            },
            events_rx,
        ))
    }

    /// This session's id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stop the session and wait for teardown to finish
    ///
    /// Safe to call repeatedly; only the first call does any work, and the
    /// stopped notification is emitted once by the session loop itself.
    pub async fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Session {}: stop already requested", self.id);
            return;
        }

        let _ = self.stop_tx.send(true);

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Session {}: loop task failed to join: {}", self.id, e);
            }
        }
    }

    /// Whether stop has been requested on this handle
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<S: CaptureSource>(
    id: SessionId,
    mut source: S,
    resampler: LinearResampler,
    mut assembler: ChunkAssembler,
    dispatcher: ChunkDispatcher,
    mut transcripts: mpsc::UnboundedReceiver<TranscriptEvent>,
    mut segmenter: UtteranceSegmenter,
    mut seg_events: mpsc::UnboundedReceiver<SegmenterEvent>,
    gate: PlaybackGate,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    mut stop_rx: watch::Receiver<bool>,
    store: Arc<SessionStore>,
) {
    let mut frames_done = false;

    let reason = 'session: loop {
        while let Ok(event) = seg_events.try_recv() {
            forward_segmenter_event(id, event, &events_tx, &store);
        }

        let deadline = segmenter.silence_deadline();
        let sleep_target = deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(60));

        tokio::select! {
            _ = stop_rx.changed() => {
                break 'session StopReason::Requested;
            }

            frame = source.next_frame(), if !frames_done => match frame {
                Some(samples) => {
                    if gate.is_muted() {
                        // Self-muting during playback: frames are dropped,
                        // not buffered, so capture resumes clean on unmute
                        assembler.clear();
                    } else {
                        assembler.push(&resampler.resample(&samples));
                        while let Some(chunk) = assembler.next_chunk() {
                            if let Err(e) = dispatcher.dispatch(&chunk).await {
                                warn!("Session {}: dispatch failed: {}", id, e);
                                break 'session StopReason::TransportFailed(e.to_string());
                            }
                        }
                    }
                }
                None => {
                    debug!("Session {}: capture stream ended", id);
                    frames_done = true;
                    if let Some(tail) = assembler.flush() {
                        if let Err(e) = dispatcher.dispatch(&tail).await {
                            warn!("Session {}: final flush failed: {}", id, e);
                            break 'session StopReason::TransportFailed(e.to_string());
                        }
                    }
                }
            },

            event = transcripts.recv() => match event {
                Some(event) => segmenter.handle_transcript(&event),
                None => {
                    break 'session StopReason::TransportFailed(
                        "transcript channel closed".to_string(),
                    );
                }
            },

            _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                segmenter.finalize_on_silence();
            }
        }
    };

    // Teardown in reverse dependency order: frames first, then timers and
    // buffers, then the transport
    source.stop();
    assembler.clear();
    segmenter.reset();
    dispatcher.close().await;
    store.remove(id);

    while let Ok(event) = seg_events.try_recv() {
        forward_segmenter_event(id, event, &events_tx, &store);
    }

    info!("Session {} stopped ({:?})", id, reason);
    let _ = events_tx.send(SessionEvent::Stopped {
        session: id,
        reason,
    });
}

fn forward_segmenter_event(
    id: SessionId,
    event: SegmenterEvent,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    store: &SessionStore,
) {
    store.touch(id);

    let mapped = match event {
        SegmenterEvent::WakeDetected => SessionEvent::WakeDetected { session: id },
        SegmenterEvent::UtteranceFinalized { text } => {
            SessionEvent::UtteranceFinalized { session: id, text }
        }
    };

    let _ = events_tx.send(mapped);
}
