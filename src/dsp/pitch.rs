//! Pitch shifting via double resampling.
//!
//! Resamples the chunk to `len / ratio` samples (moving the pitch), then back
//! to the original length (restoring the timing). Output length always equals
//! input length; any numerical failure degrades to passthrough.

use log::error;

use crate::config::{MIN_RESAMPLE_LEN, PITCH_BYPASS_EPSILON, PITCH_MAX, PITCH_MIN};
use crate::dsp::resample::resample_to;
use crate::error::DspError;

// Log only the first few failures; after that degrade silently.
const LOG_ERROR_LIMIT: u32 = 3;

pub struct PitchShifter {
    error_count: u32,
}

impl PitchShifter {
    pub fn new() -> Self {
        Self { error_count: 0 }
    }

    /// Shift pitch by `semitones`. Out-of-range values are clamped into
    /// [-12, +12], not rejected. Near-zero shifts bypass entirely.
    pub fn process(&mut self, audio: &[f32], semitones: f32) -> Vec<f32> {
        if audio.is_empty() || semitones.abs() < PITCH_BYPASS_EPSILON {
            return audio.to_vec();
        }

        let semitones = semitones.clamp(PITCH_MIN, PITCH_MAX);
        let ratio = 2.0f32.powf(semitones / 12.0);
        let mid_len = (audio.len() as f32 / ratio) as usize;
        if mid_len < MIN_RESAMPLE_LEN {
            return audio.to_vec();
        }

        match shift_via(audio, mid_len) {
            Ok(out) => out,
            Err(e) => {
                self.error_count += 1;
                if self.error_count <= LOG_ERROR_LIMIT {
                    error!("pitch shift failed: {e}");
                }
                audio.to_vec()
            }
        }
    }

    /// Hook for future stateful variants.
    pub fn reset(&mut self) {
        self.error_count = 0;
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new()
    }
}

fn shift_via(audio: &[f32], mid_len: usize) -> Result<Vec<f32>, DspError> {
    let mid = resample_to(audio, mid_len)?;
    resample_to(&mid, audio.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.04).sin()).collect()
    }

    #[test]
    fn test_length_preserved_in_range() {
        let mut shifter = PitchShifter::new();
        let input = tone(1024);
        for &st in &[-12.0, -5.0, 3.0, 12.0f32] {
            assert_eq!(shifter.process(&input, st).len(), input.len());
        }
    }

    #[test]
    fn test_out_of_range_clamped_not_rejected() {
        let mut shifter = PitchShifter::new();
        let input = tone(1024);
        for &st in &[-48.0, 24.0, 100.0f32] {
            let out = shifter.process(&input, st);
            assert_eq!(out.len(), input.len());
            // Clamped shift still changes the signal.
            assert_ne!(out, input);
        }
    }

    #[test]
    fn test_neutral_shift_bypasses() {
        let mut shifter = PitchShifter::new();
        let input = tone(256);
        assert_eq!(shifter.process(&input, 0.0), input);
        assert_eq!(shifter.process(&input, 0.05), input);
    }

    #[test]
    fn test_empty_input() {
        let mut shifter = PitchShifter::new();
        assert!(shifter.process(&[], 5.0).is_empty());
    }

    #[test]
    fn test_shifted_chunk_tail_is_not_silenced() {
        let mut shifter = PitchShifter::new();
        let input = vec![0.8; 1024];
        let out = shifter.process(&input, 12.0);
        assert_eq!(out.len(), input.len());
        // Full-scale input must come back with signal all the way to the
        // chunk edge; a zeroed tail would repeat as a dropout every chunk.
        for (i, &s) in out[out.len() - 64..].iter().enumerate() {
            assert!(s.abs() > 0.05, "tail sample {} = {s}", out.len() - 64 + i);
        }
    }

    #[test]
    fn test_tiny_input_bypasses() {
        let mut shifter = PitchShifter::new();
        let input = tone(12);
        // 12 / 2^(12/12) = 6 intermediate samples, below the safety floor.
        assert_eq!(shifter.process(&input, 12.0), input);
    }
}
