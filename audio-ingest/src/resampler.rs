/// Resampler module
///
/// Converts captured microphone frames (f32, device-native rate) into
/// 16 kHz signed 16-bit PCM for the transcription transport. Uses linear
/// interpolation so each frame is processed in a single pass.

use thiserror::Error;
use tracing::{debug, trace};

/// Target sample rate expected by the transcription transport (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Invalid sample rate: {0} Hz (must be > 0)")]
    InvalidRate(u32),
}

/// Linear-interpolation resampler with PCM16 quantization
///
/// Each output index `i` maps back to source position `i * (source/target)`;
/// the floor and ceil neighbors are blended by the fractional part, with the
/// ceil index clamped to the last valid input sample.
pub struct LinearResampler {
    source_rate: u32,
    target_rate: u32,
}

impl LinearResampler {
    /// Create a resampler from the device rate to [`TARGET_SAMPLE_RATE`]
    pub fn new(source_rate: u32) -> Result<Self, ResampleError> {
        Self::with_target(source_rate, TARGET_SAMPLE_RATE)
    }

    /// Create a resampler with an explicit target rate
    pub fn with_target(source_rate: u32, target_rate: u32) -> Result<Self, ResampleError> {
        if source_rate == 0 {
            return Err(ResampleError::InvalidRate(source_rate));
        }
        if target_rate == 0 {
            return Err(ResampleError::InvalidRate(target_rate));
        }

        debug!(
            "Creating resampler: {} Hz -> {} Hz",
            source_rate, target_rate
        );

        Ok(Self {
            source_rate,
            target_rate,
        })
    }

    /// Resample one captured frame to target-rate PCM16
    ///
    /// When source and target rates match this is an identity pass; the
    /// quantization step still applies.
    pub fn resample(&self, frame: &[f32]) -> Vec<i16> {
        if frame.is_empty() {
            return Vec::new();
        }

        if self.source_rate == self.target_rate {
            return frame.iter().copied().map(quantize_sample).collect();
        }

        let step = f64::from(self.source_rate) / f64::from(self.target_rate);
        let output_len = (frame.len() as f64 / step).round() as usize;
        let last = frame.len() - 1;

        let mut output = Vec::with_capacity(output_len);
        for i in 0..output_len {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let frac = (pos - pos.floor()) as f32;

            let lo = frame[idx];
            let hi = frame[(idx + 1).min(last)];
            output.push(quantize_sample(lo + (hi - lo) * frac));
        }

        trace!("Resampled {} -> {} samples", frame.len(), output.len());
        output
    }

    /// True when no rate conversion is performed
    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate
    }

    /// Get the source sample rate
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Get the target sample rate
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Expected output length for a given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        let ratio = f64::from(self.target_rate) / f64::from(self.source_rate);
        (input_len as f64 * ratio).round() as usize
    }
}

/// Quantize one float sample to signed 16-bit PCM
///
/// Input is clamped to [-1.0, 1.0], scaled by 32768 and rounded, then
/// saturated to the i16 range (so +1.0 maps to 32767, not a wrap).
pub fn quantize_sample(sample: f32) -> i16 {
    let scaled = (f64::from(sample.clamp(-1.0, 1.0)) * 32768.0).round() as i32;
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
