/// Voice session library
///
/// Back half of the Stockvoice capture pipeline: capture sources, the
/// playback mute gate, the TTL session store, and the lifecycle controller
/// that wires capture through resampling, dispatch and segmentation.

pub mod capture;
pub mod controller;
pub mod gate;
pub mod store;

// Re-export main types
pub use capture::{
    CaptureError, CaptureSource, MicrophoneSource, ScriptedSource, WavFileSource,
    FILE_FRAME_SAMPLES,
};
pub use controller::{
    SessionConfig, SessionController, SessionError, SessionEvent, StopReason,
};
pub use gate::PlaybackGate;
pub use store::{SessionId, SessionStore, DEFAULT_SESSION_TTL_SECS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
