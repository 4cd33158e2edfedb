/// Playback gate module
///
/// Shared mute flag keeping capture and synthesized-speech playback
/// mutually exclusive, so the pipeline never transcribes its own voice.
/// Playback completion simply unmutes the gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cloneable handle to the shared mute flag
#[derive(Clone)]
pub struct PlaybackGate {
    muted: Arc<AtomicBool>,
}

impl PlaybackGate {
    /// Create an unmuted gate
    pub fn new() -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mute capture while playback runs
    pub fn mute(&self) {
        if !self.muted.swap(true, Ordering::SeqCst) {
            debug!("Capture muted for playback");
        }
    }

    /// Resume capture after playback finishes
    pub fn unmute(&self) {
        if self.muted.swap(false, Ordering::SeqCst) {
            debug!("Capture unmuted");
        }
    }

    /// Whether capture is currently muted
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}
