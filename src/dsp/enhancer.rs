//! Voice beautification: sibilance control plus tone shelves.
//!
//! The de-esser runs a short STFT and attenuates the 4-8 kHz band; warmth
//! and presence are low/high shelf biquads whose coefficients are memoized
//! on the (warmth, presence, sample rate) triple so unchanged settings cost
//! nothing to keep applying.

use log::error;
use once_cell::sync::Lazy;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::SAMPLE_RATE;
use crate::dsp::biquad::Biquad;
use crate::dsp::utils::hann;

// STFT geometry for the de-esser.
const STFT_WIN: usize = 512;
const STFT_HOP: usize = 256;

// Sibilance band.
const DEESS_LO_HZ: f32 = 4_000.0;
const DEESS_HI_HZ: f32 = 8_000.0;

// Shelf corner frequencies.
const WARMTH_HZ: f32 = 200.0;
const PRESENCE_HZ: f32 = 3_000.0;

// Below this gain the shelf is audibly flat and skipped.
const FLAT_DB: f32 = 0.1;

static WINDOW: Lazy<Vec<f32>> = Lazy::new(|| hann(STFT_WIN));

/// Beautification settings. All fields are clamped by [`validate`], never
/// rejected.
///
/// [`validate`]: BeautifySettings::validate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeautifySettings {
    pub enabled: bool,
    /// Sibilance reduction, 0..1.
    pub deesser_strength: f32,
    /// Low shelf gain in dB, -10..+10.
    pub warmth: f32,
    /// High shelf gain in dB, -10..+10.
    pub presence: f32,
}

impl Default for BeautifySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            deesser_strength: 0.5,
            warmth: 0.0,
            presence: 0.0,
        }
    }
}

impl BeautifySettings {
    pub fn validate(mut self) -> Self {
        self.deesser_strength = self.deesser_strength.clamp(0.0, 1.0);
        self.warmth = self.warmth.clamp(-10.0, 10.0);
        self.presence = self.presence.clamp(-10.0, 10.0);
        self
    }
}

/// Memoized shelf pair. Coefficients recompute only when the keyed settings
/// actually change; filter state survives across key hits.
struct ShelfMemo {
    key: Option<(u32, u32, u32)>,
    warmth: Biquad,
    presence: Biquad,
}

impl ShelfMemo {
    fn new() -> Self {
        Self {
            key: None,
            warmth: Biquad::new(),
            presence: Biquad::new(),
        }
    }

    fn sync(&mut self, warmth_db: f32, presence_db: f32, sample_rate: u32) {
        let key = (warmth_db.to_bits(), presence_db.to_bits(), sample_rate);
        if self.key == Some(key) {
            return;
        }
        self.warmth
            .update_low_shelf(WARMTH_HZ, warmth_db, sample_rate as f32);
        self.presence
            .update_high_shelf(PRESENCE_HZ, presence_db, sample_rate as f32);
        self.warmth.reset();
        self.presence.reset();
        self.key = Some(key);
    }
}

pub struct VoiceEnhancer {
    settings: BeautifySettings,
    bypass: bool,
    memo: ShelfMemo,
    planner: FftPlanner<f32>,
}

impl VoiceEnhancer {
    pub fn new() -> Self {
        Self {
            settings: BeautifySettings::default(),
            bypass: false,
            memo: ShelfMemo::new(),
            planner: FftPlanner::new(),
        }
    }

    pub fn set_settings(&mut self, settings: BeautifySettings) {
        self.settings = settings.validate();
    }

    pub fn settings(&self) -> BeautifySettings {
        self.settings
    }

    /// Override that mutes the stage without touching the settings.
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    /// Apply de-essing and shelf EQ. Disabled or bypassed settings pass
    /// through; any non-finite result discards the whole stage for that
    /// chunk.
    pub fn process(&mut self, audio: Vec<f32>) -> Vec<f32> {
        if self.bypass || !self.settings.enabled || audio.is_empty() {
            return audio;
        }

        let mut out = audio.clone();
        if self.settings.deesser_strength > 0.01 && out.len() >= STFT_WIN {
            self.deess(&mut out);
        }

        self.memo
            .sync(self.settings.warmth, self.settings.presence, SAMPLE_RATE);
        if self.settings.warmth.abs() >= FLAT_DB {
            for s in out.iter_mut() {
                *s = self.memo.warmth.process(*s);
            }
        }
        if self.settings.presence.abs() >= FLAT_DB {
            for s in out.iter_mut() {
                *s = self.memo.presence.process(*s);
            }
        }

        if out.iter().any(|s| !s.is_finite()) {
            error!("voice enhancer produced non-finite output, passing through");
            return audio;
        }
        out
    }

    /// Overlap-add STFT with the sibilance band attenuated by up to half.
    fn deess(&mut self, audio: &mut [f32]) {
        let n = audio.len();
        let attenuation = 1.0 - self.settings.deesser_strength * 0.5;
        let bin_hz = SAMPLE_RATE as f32 / STFT_WIN as f32;
        let lo_bin = (DEESS_LO_HZ / bin_hz).ceil() as usize;
        let hi_bin = ((DEESS_HI_HZ / bin_hz).floor() as usize).min(STFT_WIN / 2);

        let forward = self.planner.plan_fft_forward(STFT_WIN);
        let inverse = self.planner.plan_fft_inverse(STFT_WIN);
        let norm = 1.0 / STFT_WIN as f32;

        let mut acc = vec![0.0f32; n];
        let mut wsum = vec![0.0f32; n];
        let mut frame = vec![Complex::new(0.0f32, 0.0); STFT_WIN];

        let mut start = 0;
        while start + STFT_WIN <= n {
            for i in 0..STFT_WIN {
                frame[i] = Complex::new(audio[start + i] * WINDOW[i], 0.0);
            }
            forward.process(&mut frame);

            for bin in lo_bin..=hi_bin {
                frame[bin] *= attenuation;
                // Mirror bin keeps the inverse transform real.
                if bin != 0 && bin != STFT_WIN / 2 {
                    frame[STFT_WIN - bin] *= attenuation;
                }
            }

            inverse.process(&mut frame);
            for i in 0..STFT_WIN {
                acc[start + i] += frame[i].re * norm * WINDOW[i];
                wsum[start + i] += WINDOW[i] * WINDOW[i];
            }
            start += STFT_HOP;
        }

        for i in 0..n {
            if wsum[i] > 1e-6 {
                audio[i] = acc[i] / wsum[i];
            }
            // Under-covered edge samples keep their original value.
        }
    }

    pub fn reset(&mut self) {
        self.memo.warmth.reset();
        self.memo.presence.reset();
    }
}

impl Default for VoiceEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn energy(v: &[f32]) -> f32 {
        v.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_disabled_passthrough() {
        let mut enh = VoiceEnhancer::new();
        let input = sine(1000.0, 1024);
        assert_eq!(enh.process(input.clone()), input);
    }

    #[test]
    fn test_settings_clamped() {
        let s = BeautifySettings {
            enabled: true,
            deesser_strength: 3.0,
            warmth: -40.0,
            presence: 99.0,
        }
        .validate();
        assert_eq!(s.deesser_strength, 1.0);
        assert_eq!(s.warmth, -10.0);
        assert_eq!(s.presence, 10.0);
    }

    #[test]
    fn test_deesser_attenuates_sibilance_band() {
        let mut enh = VoiceEnhancer::new();
        enh.set_settings(BeautifySettings {
            enabled: true,
            deesser_strength: 1.0,
            warmth: 0.0,
            presence: 0.0,
        });
        // 6 kHz sits mid-band; inner samples get full window coverage.
        let input = sine(6_000.0, 2048);
        let out = enh.process(input.clone());
        let mid = 512..1536;
        assert!(energy(&out[mid.clone()]) < energy(&input[mid]) * 0.7);
    }

    #[test]
    fn test_deesser_leaves_low_band_alone() {
        let mut enh = VoiceEnhancer::new();
        enh.set_settings(BeautifySettings {
            enabled: true,
            deesser_strength: 1.0,
            warmth: 0.0,
            presence: 0.0,
        });
        let input = sine(500.0, 2048);
        let out = enh.process(input.clone());
        let mid = 512..1536;
        let ratio = energy(&out[mid.clone()]) / energy(&input[mid]);
        assert!((ratio - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_short_chunk_skips_deesser() {
        let mut enh = VoiceEnhancer::new();
        enh.set_settings(BeautifySettings {
            enabled: true,
            deesser_strength: 1.0,
            warmth: 0.0,
            presence: 0.0,
        });
        let input = sine(6_000.0, 256);
        // Under one STFT window and flat shelves: untouched.
        assert_eq!(enh.process(input.clone()), input);
    }

    #[test]
    fn test_warmth_boosts_low_end() {
        let mut enh = VoiceEnhancer::new();
        enh.set_settings(BeautifySettings {
            enabled: true,
            deesser_strength: 0.0,
            warmth: 6.0,
            presence: 0.0,
        });
        let input = sine(100.0, 4096);
        let out = enh.process(input.clone());
        // Skip the filter settling transient.
        let tail = 2048..4096;
        assert!(energy(&out[tail.clone()]) > energy(&input[tail]) * 1.5);
    }

    #[test]
    fn test_bypass_overrides_enabled_settings() {
        let mut enh = VoiceEnhancer::new();
        enh.set_settings(BeautifySettings {
            enabled: true,
            deesser_strength: 1.0,
            warmth: 6.0,
            presence: 0.0,
        });
        enh.set_bypass(true);
        let input = sine(6_000.0, 2048);
        assert_eq!(enh.process(input.clone()), input);
    }

    #[test]
    fn test_memo_reuses_coefficients() {
        let mut memo = ShelfMemo::new();
        memo.sync(3.0, -2.0, SAMPLE_RATE);
        let key = memo.key;
        memo.sync(3.0, -2.0, SAMPLE_RATE);
        assert_eq!(memo.key, key);
        memo.sync(4.0, -2.0, SAMPLE_RATE);
        assert_ne!(memo.key, key);
    }
}
