//! Formant shifting via double resampling.
//!
//! Same resample-out/resample-back structure as the pitch shifter, driven by
//! a direct ratio instead of semitones: ratios below 1.0 deepen the voice,
//! above 1.0 raise the perceived vocal size.

use log::error;

use crate::config::{FORMANT_BYPASS_EPSILON, FORMANT_MAX, FORMANT_MIN, MIN_RESAMPLE_LEN};
use crate::dsp::resample::resample_to;
use crate::error::DspError;

const LOG_ERROR_LIMIT: u32 = 3;

pub struct FormantShifter {
    error_count: u32,
}

impl FormantShifter {
    pub fn new() -> Self {
        Self { error_count: 0 }
    }

    /// Shift the spectral envelope by `ratio`, clamped into [0.5, 2.0].
    /// Ratios within epsilon of 1.0 bypass.
    pub fn process(&mut self, audio: &[f32], ratio: f32) -> Vec<f32> {
        if audio.is_empty() || (ratio - 1.0).abs() < FORMANT_BYPASS_EPSILON {
            return audio.to_vec();
        }

        let ratio = ratio.clamp(FORMANT_MIN, FORMANT_MAX);
        let mid_len = (audio.len() as f32 / ratio) as usize;
        if mid_len < MIN_RESAMPLE_LEN {
            return audio.to_vec();
        }

        match shift_via(audio, mid_len) {
            Ok(out) => out,
            Err(e) => {
                self.error_count += 1;
                if self.error_count <= LOG_ERROR_LIMIT {
                    error!("formant shift failed: {e}");
                }
                audio.to_vec()
            }
        }
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
    }
}

impl Default for FormantShifter {
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
        (0..len).map(|i| (i as f32 * 0.07).sin()).collect()
    }

    #[test]
    fn test_length_preserved() {
        let mut shifter = FormantShifter::new();
        let input = tone(1024);
        for &r in &[0.5, 0.8, 1.3, 2.0f32] {
            assert_eq!(shifter.process(&input, r).len(), input.len());
        }
    }

    #[test]
    fn test_out_of_range_clamped() {
        let mut shifter = FormantShifter::new();
        let input = tone(1024);
        for &r in &[0.1, 5.0f32] {
            let out = shifter.process(&input, r);
            assert_eq!(out.len(), input.len());
            assert_ne!(out, input);
        }
    }

    #[test]
    fn test_neutral_ratio_bypasses() {
        let mut shifter = FormantShifter::new();
        let input = tone(512);
        assert_eq!(shifter.process(&input, 1.0), input);
        assert_eq!(shifter.process(&input, 1.04), input);
    }

    #[test]
    fn test_empty_input() {
        let mut shifter = FormantShifter::new();
        assert!(shifter.process(&[], 1.5).is_empty());
    }
}
