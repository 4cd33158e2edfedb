/// Chunk dispatcher module
///
/// Delivers bounded PCM16 chunks to the transcription transport exactly
/// once and in order, funnels synchronous and polled transcript events into
/// one FIFO channel, and latches the first terminal transport failure so
/// audio is never dropped silently afterwards.

use crate::transport::{TranscriptEvent, TranscriptionTransport, TransportError};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default transcript poll interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session terminated: {0}")]
    SessionTerminated(String),

    #[error("Dispatcher closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Interval between transcript polls
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl DispatcherConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.poll_interval.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct DispatcherState {
    chunks_dispatched: u64,
    events_forwarded: u64,
    terminal: Option<String>,
    closed: bool,
}

/// Chunk dispatcher
///
/// Owns no audio; it forwards buffers handed to it by the chunk assembler.
/// Transcript events arriving in send responses and from the periodic poll
/// task both drain into the receiver handed out at construction, preserving
/// arrival order.
pub struct ChunkDispatcher {
    transport: Arc<dyn TranscriptionTransport>,
    state: Arc<RwLock<DispatcherState>>,
    event_tx: mpsc::UnboundedSender<TranscriptEvent>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChunkDispatcher {
    /// Create a dispatcher and start its poll task
    ///
    /// Returns the dispatcher together with the FIFO transcript-event
    /// receiver the segmenter consumes.
    pub fn new(
        transport: Arc<dyn TranscriptionTransport>,
        config: DispatcherConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TranscriptEvent>), DispatchError> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let state = Arc::new(RwLock::new(DispatcherState {
            chunks_dispatched: 0,
            events_forwarded: 0,
            terminal: None,
            closed: false,
        }));

        let poll_task = spawn_poll_task(
            Arc::clone(&transport),
            Arc::clone(&state),
            event_tx.clone(),
            config.poll_interval,
        );

        debug!(
            "Dispatcher started (poll every {}ms)",
            config.poll_interval.as_millis()
        );

        Ok((
            Self {
                transport,
                state,
                event_tx,
                poll_task: Mutex::new(Some(poll_task)),
            },
            event_rx,
        ))
    }

    /// Deliver one chunk to the transport
    ///
    /// Fails fast once the session has terminated or the dispatcher was
    /// closed; a transport failure latches the terminal state so the owner
    /// is notified instead of audio silently vanishing.
    pub async fn dispatch(&self, chunk: &[i16]) -> Result<(), DispatchError> {
        {
            let state = self.state.read().await;
            if state.closed {
                return Err(DispatchError::Closed);
            }
            if let Some(reason) = &state.terminal {
                return Err(DispatchError::SessionTerminated(reason.clone()));
            }
        }

        let payload = encode_pcm16(chunk);

        match self.transport.send_chunk(payload).await {
            Ok(events) => {
                let mut state = self.state.write().await;
                state.chunks_dispatched += 1;
                for event in events {
                    if self.event_tx.send(event).is_ok() {
                        state.events_forwarded += 1;
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!("Transport rejected chunk: {}", e);
                let mut state = self.state.write().await;
                state.terminal = Some(e.to_string());
                Err(DispatchError::Transport(e))
            }
        }
    }

    /// Close the dispatcher
    ///
    /// Stops the poll task and notifies the remote side. Idempotent and
    /// best-effort: safe to call repeatedly or after a terminal error.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if state.closed {
                return;
            }
            state.closed = true;
        }

        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }

        self.transport.close().await;
        info!("Dispatcher closed");
    }

    /// Whether a terminal transport error has been recorded
    pub async fn is_terminated(&self) -> bool {
        self.state.read().await.terminal.is_some()
    }

    /// Get current statistics
    pub async fn stats(&self) -> DispatcherStats {
        let state = self.state.read().await;
        DispatcherStats {
            chunks_dispatched: state.chunks_dispatched,
            events_forwarded: state.events_forwarded,
            is_terminated: state.terminal.is_some(),
            is_closed: state.closed,
        }
    }
}

/// Dispatcher statistics
#[derive(Debug, Clone)]
pub struct DispatcherStats {
    pub chunks_dispatched: u64,
    pub events_forwarded: u64,
    pub is_terminated: bool,
    pub is_closed: bool,
}

/// Encode PCM16 samples as little-endian bytes for the wire
pub fn encode_pcm16(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample);
    }
    buf.freeze()
}

fn spawn_poll_task(
    transport: Arc<dyn TranscriptionTransport>,
    state: Arc<RwLock<DispatcherState>>,
    event_tx: mpsc::UnboundedSender<TranscriptEvent>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            {
                let state = state.read().await;
                if state.closed || state.terminal.is_some() {
                    break;
                }
            }

            match transport.poll_events().await {
                Ok(events) => {
                    if events.is_empty() {
                        continue;
                    }
                    let mut state = state.write().await;
                    for event in events {
                        if event_tx.send(event).is_ok() {
                            state.events_forwarded += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Transcript poll failed: {}", e);
                    state.write().await.terminal = Some(e.to_string());
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTranscriptionTransport;

    fn partial(text: &str) -> TranscriptEvent {
        TranscriptEvent::Partial {
            text: text.to_string(),
            confidence: None,
        }
    }

    #[test]
    fn test_encode_pcm16_little_endian() {
        let bytes = encode_pcm16(&[1, -2, 0x1234]);
        assert_eq!(bytes.as_ref(), &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn test_config_validation() {
        let config = DispatcherConfig {
            poll_interval: Duration::ZERO,
        };
        assert!(config.validate().is_err());
        assert!(DispatcherConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_forwards_response_events_in_order() {
        let transport = Arc::new(MockTranscriptionTransport::new());
        transport.push_send_response(vec![partial("one"), partial("two")]);

        let (dispatcher, mut events) =
            ChunkDispatcher::new(transport.clone(), DispatcherConfig::default()).unwrap();

        dispatcher.dispatch(&vec![0i16; 800]).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), partial("one"));
        assert_eq!(events.recv().await.unwrap(), partial("two"));

        let stats = dispatcher.stats().await;
        assert_eq!(stats.chunks_dispatched, 1);
        assert_eq!(stats.events_forwarded, 2);

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_terminal_error_latches() {
        let transport = Arc::new(MockTranscriptionTransport::new());
        transport.expire_after(0);

        let (dispatcher, _events) =
            ChunkDispatcher::new(transport.clone(), DispatcherConfig::default()).unwrap();

        let first = dispatcher.dispatch(&vec![0i16; 800]).await;
        assert!(matches!(first, Err(DispatchError::Transport(_))));

        // Subsequent sends fail fast without reaching the transport
        let second = dispatcher.dispatch(&vec![0i16; 800]).await;
        assert!(matches!(second, Err(DispatchError::SessionTerminated(_))));
        assert!(transport.sent_chunks().is_empty());
        assert!(dispatcher.is_terminated().await);

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_poll_task_forwards_events() {
        let transport = Arc::new(MockTranscriptionTransport::new());
        transport.push_poll_response(vec![partial("polled")]);

        let config = DispatcherConfig {
            poll_interval: Duration::from_millis(10),
        };
        let (dispatcher, mut events) = ChunkDispatcher::new(transport, config).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("poll task did not forward in time")
            .unwrap();
        assert_eq!(event, partial("polled"));

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = Arc::new(MockTranscriptionTransport::new());
        let (dispatcher, _events) =
            ChunkDispatcher::new(transport.clone(), DispatcherConfig::default()).unwrap();

        dispatcher.close().await;
        dispatcher.close().await;

        assert!(transport.is_closed());
        let result = dispatcher.dispatch(&vec![0i16; 800]).await;
        assert!(matches!(result, Err(DispatchError::Closed)));
    }
}
