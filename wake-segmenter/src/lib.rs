/// Wake segmenter library
///
/// Detects a configured trigger phrase in a bounded rolling window of
/// streaming transcript text and segments the utterance that follows it,
/// finalizing on silence.

pub mod segmenter;
pub mod wake_buffer;

// Re-export main types
pub use segmenter::{
    SegmenterConfig, SegmenterError, SegmenterEvent, SegmenterState, SegmenterStats,
    UtteranceSegmenter, DEFAULT_SILENCE_TIMEOUT_MS, DEFAULT_TRIGGER_PHRASE,
};
pub use wake_buffer::{WakeBuffer, WAKE_WINDOW_CHARS};
