/// Utterance segmenter module
///
/// Two-state machine over the transcript event stream: watch a bounded
/// rolling window for the trigger phrase, then accumulate the spoken query
/// until a fixed stretch of silence finalizes it.

use crate::wake_buffer::{WakeBuffer, WAKE_WINDOW_CHARS};
use audio_ingest::TranscriptEvent;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Default trigger phrase
pub const DEFAULT_TRIGGER_PHRASE: &str = "hey johnny";

/// Default silence timeout before an utterance finalizes (2s)
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 2000;

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Segmenter configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Trigger phrase, matched case-insensitively
    pub trigger_phrase: String,

    /// Silence duration that finalizes an utterance
    pub silence_timeout: Duration,

    /// Rolling wake-window size in characters
    pub wake_window_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_string(),
            silence_timeout: Duration::from_millis(DEFAULT_SILENCE_TIMEOUT_MS),
            wake_window_chars: WAKE_WINDOW_CHARS,
        }
    }
}

impl SegmenterConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), SegmenterError> {
        let trigger = self.trigger_phrase.trim();
        if trigger.is_empty() {
            return Err(SegmenterError::InvalidConfig(
                "trigger_phrase must not be empty".to_string(),
            ));
        }

        if self.silence_timeout.is_zero() {
            return Err(SegmenterError::InvalidConfig(
                "silence_timeout must be greater than zero".to_string(),
            ));
        }

        if self.wake_window_chars < trigger.chars().count() {
            return Err(SegmenterError::InvalidConfig(format!(
                "wake_window_chars ({}) is smaller than the trigger phrase ({})",
                self.wake_window_chars,
                trigger.chars().count()
            )));
        }

        Ok(())
    }
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Watching the rolling window for the trigger phrase
    AwaitingWakeWord,

    /// Accumulating the utterance until the silence deadline fires
    Recording,
}

/// Notification emitted by the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterEvent {
    /// Trigger phrase seen; recording started
    WakeDetected,

    /// Silence elapsed; the accumulated query is complete
    UtteranceFinalized { text: String },
}

/// Wake-word and utterance segmenter
pub struct UtteranceSegmenter {
    trigger: String,
    silence_timeout: Duration,
    state: SegmenterState,
    wake_buffer: WakeBuffer,
    utterance: String,
    silence_deadline: Option<Instant>,
    event_tx: mpsc::UnboundedSender<SegmenterEvent>,
    wake_detections: u64,
    utterances_emitted: u64,
}

impl UtteranceSegmenter {
    /// Create a segmenter and its event receiver
    pub fn new(
        config: SegmenterConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SegmenterEvent>), SegmenterError> {
        config.validate()?;

        let trigger = config.trigger_phrase.trim().to_lowercase();
        debug!(
            "Segmenter ready (trigger {:?}, silence {}ms)",
            trigger,
            config.silence_timeout.as_millis()
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                trigger,
                silence_timeout: config.silence_timeout,
                state: SegmenterState::AwaitingWakeWord,
                wake_buffer: WakeBuffer::with_capacity(config.wake_window_chars),
                utterance: String::new(),
                silence_deadline: None,
                event_tx,
                wake_detections: 0,
                utterances_emitted: 0,
            },
            event_rx,
        ))
    }

    /// Feed one transcript event through the state machine
    ///
    /// Events must arrive in service order; partial and final transcripts
    /// are treated alike since the service resends corrected text either
    /// way.
    pub fn handle_transcript(&mut self, event: &TranscriptEvent) {
        match self.state {
            SegmenterState::AwaitingWakeWord => {
                self.wake_buffer.push(event.text());

                if self.wake_buffer.contains_phrase(&self.trigger) {
                    info!("Wake phrase detected");
                    // The triggering event is consumed whole; any text after
                    // the phrase in the same event is not recorded.
                    self.wake_buffer.clear();
                    self.utterance.clear();
                    self.state = SegmenterState::Recording;
                    self.wake_detections += 1;
                    // Arm the deadline now so a wake with no follow-up
                    // speech drains back to the awaiting state.
                    self.silence_deadline = Some(Instant::now() + self.silence_timeout);
                    let _ = self.event_tx.send(SegmenterEvent::WakeDetected);
                }
            }
            SegmenterState::Recording => {
                let stripped = strip_phrase(event.text(), &self.trigger);

                if !stripped.trim().is_empty() {
                    // Replacement semantics: the service resends the
                    // corrected utterance on each event, so the latest text
                    // wins outright.
                    trace!("Utterance now {:?}", stripped);
                    self.utterance = stripped;
                    self.silence_deadline = Some(Instant::now() + self.silence_timeout);
                }
            }
        }
    }

    /// Deadline the owner should sleep until, when one is armed
    pub fn silence_deadline(&self) -> Option<Instant> {
        self.silence_deadline
    }

    /// Finalize the utterance after the silence deadline fires
    ///
    /// Collapses whitespace, strips residual trigger occurrences and emits
    /// the query if anything remains; either way the machine returns to
    /// awaiting the wake word. Calling this while not recording is a no-op.
    pub fn finalize_on_silence(&mut self) {
        self.silence_deadline = None;

        if self.state != SegmenterState::Recording {
            return;
        }

        let cleaned = normalize_whitespace(&strip_phrase(&self.utterance, &self.trigger));
        self.utterance.clear();
        self.state = SegmenterState::AwaitingWakeWord;

        if cleaned.is_empty() {
            debug!("Utterance empty after stripping, back to awaiting");
            return;
        }

        info!("Utterance finalized: {:?}", cleaned);
        self.utterances_emitted += 1;
        let _ = self
            .event_tx
            .send(SegmenterEvent::UtteranceFinalized { text: cleaned });
    }

    /// Reset all buffers and return to the awaiting state
    pub fn reset(&mut self) {
        self.wake_buffer.clear();
        self.utterance.clear();
        self.silence_deadline = None;
        self.state = SegmenterState::AwaitingWakeWord;
        debug!("Segmenter reset");
    }

    /// Current state
    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Get current statistics
    pub fn stats(&self) -> SegmenterStats {
        SegmenterStats {
            wake_detections: self.wake_detections,
            utterances_emitted: self.utterances_emitted,
            is_recording: self.state == SegmenterState::Recording,
        }
    }
}

/// Segmenter statistics
#[derive(Debug, Clone)]
pub struct SegmenterStats {
    pub wake_detections: u64,
    pub utterances_emitted: u64,
    pub is_recording: bool,
}

/// Remove every occurrence of `phrase`, ASCII-case-insensitively
fn strip_phrase(text: &str, phrase: &str) -> String {
    if phrase.is_empty() {
        return text.to_string();
    }

    let n = phrase.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        if i + n <= text.len()
            && text.is_char_boundary(i + n)
            && text[i..i + n].eq_ignore_ascii_case(phrase)
        {
            i += n;
            continue;
        }

        match text[i..].chars().next() {
            Some(ch) => {
                out.push(ch);
                i += ch.len_utf8();
            }
            None => break,
        }
    }

    out
}

/// Collapse whitespace runs to single spaces and trim the ends
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
