/// Audio ingest library
///
/// Front half of the Stockvoice capture pipeline: linear resampling to
/// 16 kHz PCM16, duration-bounded chunk assembly, and ordered dispatch to a
/// streaming transcription transport.

pub mod chunker;
pub mod dispatcher;
pub mod resampler;
pub mod transport;

// Re-export main types
pub use chunker::{ChunkAssembler, MAX_CHUNK_SAMPLES, MIN_CHUNK_SAMPLES};
pub use dispatcher::{
    encode_pcm16, ChunkDispatcher, DispatchError, DispatcherConfig, DispatcherStats,
    DEFAULT_POLL_INTERVAL_MS,
};
pub use resampler::{quantize_sample, LinearResampler, ResampleError, TARGET_SAMPLE_RATE};
pub use transport::{
    decode_message, MockTranscriptionTransport, TranscriptEvent, TranscriptionTransport,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
