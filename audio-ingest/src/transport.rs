/// Transcription transport module
///
/// The typed seam to the remote streaming transcription service: transcript
/// event types, wire-message decoding, the transport capability trait, and a
/// scripted mock used by tests and the demo binary.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transcription session expired")]
    SessionExpired,

    #[error("Transcription session closed")]
    SessionClosed,

    #[error("Remote transcription error: {0}")]
    Remote(String),

    #[error("Chunk send failed: {0}")]
    SendFailed(String),
}

/// Incremental transcript produced by the remote service
///
/// Partial events carry provisional text that later events may correct;
/// Final events are confirmed. Consumers rely on arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Partial {
        text: String,
        confidence: Option<f32>,
    },
    Final {
        text: String,
        confidence: Option<f32>,
    },
}

impl TranscriptEvent {
    /// The transcript text carried by this event
    pub fn text(&self) -> &str {
        match self {
            Self::Partial { text, .. } | Self::Final { text, .. } => text,
        }
    }

    /// True for confirmed (final) transcripts
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// Raw wire message shape
#[derive(Debug, Deserialize)]
struct WireMessage {
    message_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one raw JSON transport message
///
/// Malformed payloads and unknown message types are logged and skipped
/// (`Ok(None)`) rather than terminating the session; session expiry and
/// remote errors surface as [`TransportError`]s.
pub fn decode_message(raw: &str) -> Result<Option<TranscriptEvent>, TransportError> {
    let msg: WireMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Skipping malformed transport message: {}", e);
            return Ok(None);
        }
    };

    match msg.message_type.as_str() {
        "PartialTranscript" => Ok(Some(TranscriptEvent::Partial {
            text: msg.text.unwrap_or_default(),
            confidence: msg.confidence,
        })),
        "FinalTranscript" => Ok(Some(TranscriptEvent::Final {
            text: msg.text.unwrap_or_default(),
            confidence: msg.confidence,
        })),
        "SessionExpired" => Err(TransportError::SessionExpired),
        "error" => Err(TransportError::Remote(
            msg.error.unwrap_or_else(|| "unspecified".to_string()),
        )),
        other => {
            warn!("Skipping unknown transport message type: {}", other);
            Ok(None)
        }
    }
}

/// Capability interface to a streaming transcription session
///
/// Implementations accept binary 16 kHz mono PCM16 chunks between 50 ms and
/// 1000 ms and produce transcript events, either synchronously in the send
/// response or via the periodic poll.
#[async_trait]
pub trait TranscriptionTransport: Send + Sync {
    /// Deliver one PCM16 chunk; events returned arrive in service order
    async fn send_chunk(&self, chunk: Bytes) -> Result<Vec<TranscriptEvent>, TransportError>;

    /// Fetch events produced since the last poll
    async fn poll_events(&self) -> Result<Vec<TranscriptEvent>, TransportError>;

    /// Close the session. Idempotent and best-effort: never fails even if
    /// the remote side is already gone.
    async fn close(&self);
}

struct MockState {
    send_script: VecDeque<Vec<TranscriptEvent>>,
    poll_script: VecDeque<Vec<TranscriptEvent>>,
    sent: Vec<Bytes>,
    sends_before_expiry: Option<usize>,
    closed: bool,
}

/// Scripted in-process transport
///
/// Replays configured event batches in response to sends and polls, records
/// every payload it receives, and can be armed to expire the session after a
/// fixed number of sends.
pub struct MockTranscriptionTransport {
    state: Mutex<MockState>,
}

impl MockTranscriptionTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                send_script: VecDeque::new(),
                poll_script: VecDeque::new(),
                sent: Vec::new(),
                sends_before_expiry: None,
                closed: false,
            }),
        }
    }

    /// Queue the event batch returned by the next unscripted send
    pub fn push_send_response(&self, events: Vec<TranscriptEvent>) {
        self.state.lock().unwrap().send_script.push_back(events);
    }

    /// Queue the event batch returned by the next poll
    pub fn push_poll_response(&self, events: Vec<TranscriptEvent>) {
        self.state.lock().unwrap().poll_script.push_back(events);
    }

    /// Expire the session after `sends` successful chunk deliveries
    pub fn expire_after(&self, sends: usize) {
        self.state.lock().unwrap().sends_before_expiry = Some(sends);
    }

    /// Payloads delivered so far, in order
    pub fn sent_chunks(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Whether close() has been observed
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl Default for MockTranscriptionTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionTransport for MockTranscriptionTransport {
    async fn send_chunk(&self, chunk: Bytes) -> Result<Vec<TranscriptEvent>, TransportError> {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return Err(TransportError::SessionClosed);
        }

        if let Some(remaining) = state.sends_before_expiry {
            if remaining == 0 {
                return Err(TransportError::SessionExpired);
            }
            state.sends_before_expiry = Some(remaining - 1);
        }

        state.sent.push(chunk);
        Ok(state.send_script.pop_front().unwrap_or_default())
    }

    async fn poll_events(&self) -> Result<Vec<TranscriptEvent>, TransportError> {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return Err(TransportError::SessionClosed);
        }

        Ok(state.poll_script.pop_front().unwrap_or_default())
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            debug!("Mock transport closed");
        }
    }
}
