//! Noise suppression with graceful degradation.
//!
//! A spectral gate estimates the noise floor from the quietest bins of each
//! chunk and subtracts it, scaled by the configured intensity. The reduction
//! backend is pluggable; after three cumulative failures the suppressor
//! latches into permanent passthrough for the rest of the session.

use std::sync::Arc;

use log::error;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::SAMPLE_RATE;
use crate::dsp::utils::is_silent;
use crate::error::DspError;

// Failures before the suppressor gives up for good.
const MAX_ERRORS: u32 = 3;

/// Suppression strength presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    Light,
    Medium,
    Aggressive,
}

impl Intensity {
    pub fn strength(self) -> f32 {
        match self {
            Intensity::Light => 0.5,
            Intensity::Medium => 0.8,
            Intensity::Aggressive => 1.0,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "light" => Some(Intensity::Light),
            "medium" => Some(Intensity::Medium),
            "aggressive" => Some(Intensity::Aggressive),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Intensity::Light => "light",
            Intensity::Medium => "medium",
            Intensity::Aggressive => "aggressive",
        }
    }
}

/// Reduction algorithm seam. The builtin spectral gate is the default;
/// tests inject failing backends to exercise the fallback latch.
pub trait ReductionBackend: Send {
    fn reduce(&mut self, audio: &[f32], sample_rate: u32, strength: f32)
        -> Result<Vec<f32>, DspError>;
}

/// Whole-chunk spectral subtraction. The noise floor is the mean magnitude
/// of the quietest quarter of the bins.
pub struct SpectralGate {
    planner: FftPlanner<f32>,
    fft_len: usize,
    forward: Option<Arc<dyn Fft<f32>>>,
    inverse: Option<Arc<dyn Fft<f32>>>,
}

impl SpectralGate {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            fft_len: 0,
            forward: None,
            inverse: None,
        }
    }

    fn plan(&mut self, len: usize) {
        if self.fft_len != len {
            self.forward = Some(self.planner.plan_fft_forward(len));
            self.inverse = Some(self.planner.plan_fft_inverse(len));
            self.fft_len = len;
        }
    }
}

impl Default for SpectralGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReductionBackend for SpectralGate {
    fn reduce(
        &mut self,
        audio: &[f32],
        _sample_rate: u32,
        strength: f32,
    ) -> Result<Vec<f32>, DspError> {
        self.plan(audio.len());
        let forward = self.forward.as_ref().ok_or(DspError::NonFinite("fft plan"))?;
        let inverse = self.inverse.as_ref().ok_or(DspError::NonFinite("fft plan"))?;

        let mut spectrum: Vec<Complex<f32>> =
            audio.iter().map(|&s| Complex::new(s, 0.0)).collect();
        forward.process(&mut spectrum);

        let mut mags: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
        let mut sorted = mags.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let quartile = (sorted.len() / 4).max(1);
        let floor = sorted[..quartile].iter().sum::<f32>() / quartile as f32;

        // Over-subtract by the strength factor, floor the gain at zero.
        let subtract = floor * (1.0 + strength);
        for (c, mag) in spectrum.iter_mut().zip(mags.iter_mut()) {
            if *mag > 1e-12 {
                let gain = ((*mag - subtract) / *mag).max(0.0);
                *c *= gain;
            }
        }

        inverse.process(&mut spectrum);
        let norm = 1.0 / audio.len() as f32;
        let out: Vec<f32> = spectrum.iter().map(|c| c.re * norm).collect();
        if out.iter().any(|s| !s.is_finite()) {
            return Err(DspError::NonFinite("spectral gate output"));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseStats {
    pub processed: u64,
    pub errors: u32,
    pub fallback: bool,
}

pub struct NoiseSuppressor {
    enabled: bool,
    fallback: bool,
    intensity: Intensity,
    processed: u64,
    errors: u32,
    backend: Box<dyn ReductionBackend>,
}

impl NoiseSuppressor {
    pub fn new() -> Self {
        Self::with_backend(Box::new(SpectralGate::new()))
    }

    pub fn with_backend(backend: Box<dyn ReductionBackend>) -> Self {
        Self {
            enabled: false,
            fallback: false,
            intensity: Intensity::Medium,
            processed: 0,
            errors: 0,
            backend,
        }
    }

    /// Enable suppression, forgiving any previous fallback latch. Callers
    /// should invoke this on the disabled-to-enabled edge only.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.fallback = false;
        self.errors = 0;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_intensity(&mut self, intensity: Intensity) {
        self.intensity = intensity;
    }

    pub fn intensity(&self) -> Intensity {
        self.intensity
    }

    /// Reduce noise in the chunk. Disabled, latched, empty, or all-silent
    /// input passes through untouched.
    pub fn process(&mut self, audio: Vec<f32>) -> Vec<f32> {
        if !self.enabled || self.fallback || audio.is_empty() {
            return audio;
        }
        if is_silent(&audio) {
            return audio;
        }

        match self
            .backend
            .reduce(&audio, SAMPLE_RATE, self.intensity.strength())
        {
            Ok(out) => {
                self.processed += 1;
                out
            }
            Err(e) => {
                self.errors += 1;
                error!("noise reduction failed ({}/{MAX_ERRORS}): {e}", self.errors);
                if self.errors >= MAX_ERRORS {
                    self.fallback = true;
                    error!("noise reduction disabled for this session after repeated failures");
                }
                audio
            }
        }
    }

    pub fn stats(&self) -> NoiseStats {
        NoiseStats {
            processed: self.processed,
            errors: self.errors,
            fallback: self.fallback,
        }
    }
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32;
                0.5 * (t * 0.1).sin() + 0.05 * (t * 2.11).sin() + 0.03 * (t * 3.7).cos()
            })
            .collect()
    }

    #[test]
    fn test_disabled_passthrough() {
        let mut ns = NoiseSuppressor::new();
        let input = noisy_tone(1024);
        assert_eq!(ns.process(input.clone()), input);
        assert_eq!(ns.stats().processed, 0);
    }

    #[test]
    fn test_silence_skipped() {
        let mut ns = NoiseSuppressor::new();
        ns.enable();
        let silence = vec![0.0; 1024];
        assert_eq!(ns.process(silence.clone()), silence);
        assert_eq!(ns.stats().processed, 0);
    }

    #[test]
    fn test_reduces_energy() {
        let mut ns = NoiseSuppressor::new();
        ns.enable();
        let input = noisy_tone(1024);
        let out = ns.process(input.clone());
        assert_eq!(out.len(), input.len());
        let energy = |v: &[f32]| v.iter().map(|s| s * s).sum::<f32>();
        assert!(energy(&out) < energy(&input));
        assert_eq!(ns.stats().processed, 1);
    }

    #[test]
    fn test_intensity_parsing() {
        assert_eq!(Intensity::parse("light"), Some(Intensity::Light));
        assert_eq!(Intensity::parse("aggressive"), Some(Intensity::Aggressive));
        assert_eq!(Intensity::parse("extreme"), None);
        assert_eq!(Intensity::Aggressive.strength(), 1.0);
    }

    struct FailingBackend;

    impl ReductionBackend for FailingBackend {
        fn reduce(&mut self, _: &[f32], _: u32, _: f32) -> Result<Vec<f32>, DspError> {
            Err(DspError::Backend("induced".into()))
        }
    }

    #[test]
    fn test_three_failures_latch_fallback() {
        let mut ns = NoiseSuppressor::with_backend(Box::new(FailingBackend));
        ns.enable();
        let input = noisy_tone(256);

        for _ in 0..3 {
            assert_eq!(ns.process(input.clone()), input);
        }
        let stats = ns.stats();
        assert_eq!(stats.errors, 3);
        assert!(stats.fallback);

        // Latched: further chunks bypass without touching the backend.
        assert_eq!(ns.process(input.clone()), input);
        assert_eq!(ns.stats().errors, 3);
    }

    #[test]
    fn test_enable_clears_latch() {
        let mut ns = NoiseSuppressor::with_backend(Box::new(FailingBackend));
        ns.enable();
        let input = noisy_tone(256);
        for _ in 0..3 {
            ns.process(input.clone());
        }
        assert!(ns.stats().fallback);

        ns.enable();
        let stats = ns.stats();
        assert!(!stats.fallback);
        assert_eq!(stats.errors, 0);
    }
}
