/// Wake buffer module
///
/// A bounded rolling window of recent transcript text used only for trigger
/// phrase detection. Keeping the window small means the wake phrase must be
/// found in a short tail while the utterance itself can grow freely.

use tracing::trace;

/// Rolling window size in characters
pub const WAKE_WINDOW_CHARS: usize = 50;

/// Bounded rolling text window
///
/// Text is lower-cased on entry and the window is truncated to its trailing
/// characters after every append, so a phrase split across events is still
/// visible as long as both halves fall inside the window. Truncation counts
/// characters, never bytes, so multi-byte text cannot split a code point.
pub struct WakeBuffer {
    window: String,
    capacity: usize,
}

impl WakeBuffer {
    /// Create a buffer with the default window size
    pub fn new() -> Self {
        Self::with_capacity(WAKE_WINDOW_CHARS)
    }

    /// Create a buffer with a custom window size
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: String::new(),
            capacity,
        }
    }

    /// Append transcript text, keeping only the trailing window
    pub fn push(&mut self, text: &str) {
        self.window.push_str(&text.to_lowercase());

        let excess = self.window.chars().count().saturating_sub(self.capacity);
        if excess > 0 {
            if let Some((cut, _)) = self.window.char_indices().nth(excess) {
                self.window.drain(..cut);
            }
        }

        trace!("Wake window: {:?}", self.window);
    }

    /// Check whether the window contains the (lower-cased) phrase
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        self.window.contains(phrase)
    }

    /// Discard the window contents
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Window length in characters
    pub fn len(&self) -> usize {
        self.window.chars().count()
    }

    /// Check whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Current window contents
    pub fn as_str(&self) -> &str {
        &self.window
    }

    /// Window capacity in characters
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for WakeBuffer {
    fn default() -> Self {
        Self::new()
    }
}
