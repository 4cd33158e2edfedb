/// Chunk assembly module
///
/// Accumulates quantized PCM16 samples and slices them into
/// duration-bounded chunks that satisfy the transcription transport's
/// 50 ms - 1000 ms contract at 16 kHz.

use tracing::{debug, trace};

/// Minimum chunk size released to the dispatcher (50ms at 16kHz)
pub const MIN_CHUNK_SAMPLES: usize = 800;

/// Maximum chunk size released per call (1000ms at 16kHz)
pub const MAX_CHUNK_SAMPLES: usize = 16000;

/// Bounded chunk assembler
///
/// Samples accumulate in a pending buffer; `next_chunk` releases a slice
/// only once at least [`MIN_CHUNK_SAMPLES`] are pending and never more than
/// [`MAX_CHUNK_SAMPLES`] at a time, leaving the remainder for later frames.
pub struct ChunkAssembler {
    pending: Vec<i16>,
    chunks_released: u64,
}

impl ChunkAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            chunks_released: 0,
        }
    }

    /// Append resampled samples to the pending buffer
    pub fn push(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        trace!(
            "Buffered {} samples ({} pending)",
            samples.len(),
            self.pending.len()
        );
    }

    /// Release the next bounded chunk, if enough audio is pending
    pub fn next_chunk(&mut self) -> Option<Vec<i16>> {
        if self.pending.len() < MIN_CHUNK_SAMPLES {
            return None;
        }

        let take = self.pending.len().min(MAX_CHUNK_SAMPLES);
        let chunk: Vec<i16> = self.pending.drain(..take).collect();
        self.chunks_released += 1;

        trace!(
            "Released chunk {} ({} samples, {} pending)",
            self.chunks_released,
            chunk.len(),
            self.pending.len()
        );

        Some(chunk)
    }

    /// Release whatever remains, regardless of the minimum bound
    ///
    /// This is the only path that may emit a chunk shorter than
    /// [`MIN_CHUNK_SAMPLES`]; callers use it once at teardown.
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        if self.pending.is_empty() {
            return None;
        }

        let take = self.pending.len().min(MAX_CHUNK_SAMPLES);
        let chunk: Vec<i16> = self.pending.drain(..take).collect();
        debug!("Flushed final chunk of {} samples", chunk.len());
        Some(chunk)
    }

    /// Discard all pending samples
    ///
    /// Used when capture is muted during playback so nothing recorded while
    /// the system is speaking reaches the transport.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending samples", self.pending.len());
            self.pending.clear();
        }
    }

    /// Number of samples currently pending
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Check whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total chunks released so far (excluding flushes)
    pub fn chunks_released(&self) -> u64 {
        self.chunks_released
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_below_minimum() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; MIN_CHUNK_SAMPLES - 1]);

        assert!(assembler.next_chunk().is_none());
        assert_eq!(assembler.pending_len(), MIN_CHUNK_SAMPLES - 1);
    }

    #[test]
    fn test_releases_at_minimum() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; MIN_CHUNK_SAMPLES]);

        let chunk = assembler.next_chunk().unwrap();
        assert_eq!(chunk.len(), MIN_CHUNK_SAMPLES);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_caps_at_maximum_and_keeps_remainder() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; MAX_CHUNK_SAMPLES + 500]);

        let chunk = assembler.next_chunk().unwrap();
        assert_eq!(chunk.len(), MAX_CHUNK_SAMPLES);
        assert_eq!(assembler.pending_len(), 500);

        // Remainder is below the minimum, so it stays pending
        assert!(assembler.next_chunk().is_none());
    }

    #[test]
    fn test_accumulates_across_pushes() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; 300]);
        assembler.push(&vec![2; 300]);
        assert!(assembler.next_chunk().is_none());

        assembler.push(&vec![3; 300]);
        let chunk = assembler.next_chunk().unwrap();
        assert_eq!(chunk.len(), 900);
        assert_eq!(chunk[0], 1);
        assert_eq!(chunk[899], 3);
    }

    #[test]
    fn test_flush_releases_short_tail() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![7; 123]);

        let chunk = assembler.flush().unwrap();
        assert_eq!(chunk.len(), 123);
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; 5000]);

        assembler.clear();
        assert!(assembler.is_empty());
        assert!(assembler.next_chunk().is_none());
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_chunk_counter() {
        let mut assembler = ChunkAssembler::new();
        assembler.push(&vec![1; MAX_CHUNK_SAMPLES * 2]);

        assert!(assembler.next_chunk().is_some());
        assert!(assembler.next_chunk().is_some());
        assert_eq!(assembler.chunks_released(), 2);
    }
}
