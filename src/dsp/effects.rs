//! Optional ordered effects chain.
//!
//! Fixed order: distortion -> chorus -> reverb -> delay -> compressor. The
//! chain runs on a backend selected once at construction: a native DSP
//! library when one is available for the platform, otherwise the
//! self-contained builtin units below. Parameter updates merge into typed
//! per-effect structs and rebuild the chain lazily (only enabled effects are
//! instantiated).

use log::error;

use crate::config::SAMPLE_RATE;
use crate::dsp::utils::db_to_gain;
use crate::error::{DspError, EngineError};

// -----------------------------------------------------------------------------
// Typed per-effect parameters
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub enabled: bool,
    pub room_size: f32,
    pub wet_level: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            enabled: false,
            room_size: 0.5,
            wet_level: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusParams {
    pub enabled: bool,
    pub rate_hz: f32,
    pub depth: f32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_hz: 1.0,
            depth: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParams {
    pub enabled: bool,
    pub drive_db: f32,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self {
            enabled: false,
            drive_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ratio: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -20.0,
            ratio: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayParams {
    pub enabled: bool,
    pub time: f32,
    pub feedback: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            enabled: false,
            time: 0.3,
            feedback: 0.5,
        }
    }
}

/// The full effect parameter set, one entry per effect kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectsParams {
    pub distortion: DistortionParams,
    pub chorus: ChorusParams,
    pub reverb: ReverbParams,
    pub delay: DelayParams,
    pub compressor: CompressorParams,
}

impl EffectsParams {
    /// Merge one field of one effect. `enabled` is accepted as a field with
    /// zero meaning false.
    pub fn set(&mut self, effect: &str, field: &str, value: f32) -> Result<(), EngineError> {
        let unknown = || EngineError::UnknownParam(format!("effect:{effect}:{field}"));
        match (effect, field) {
            ("distortion", "enabled") => self.distortion.enabled = value != 0.0,
            ("distortion", "drive_db") => self.distortion.drive_db = value,
            ("chorus", "enabled") => self.chorus.enabled = value != 0.0,
            ("chorus", "rate_hz") => self.chorus.rate_hz = value,
            ("chorus", "depth") => self.chorus.depth = value,
            ("reverb", "enabled") => self.reverb.enabled = value != 0.0,
            ("reverb", "room_size") => self.reverb.room_size = value,
            ("reverb", "wet_level") => self.reverb.wet_level = value,
            ("delay", "enabled") => self.delay.enabled = value != 0.0,
            ("delay", "time") => self.delay.time = value,
            ("delay", "feedback") => self.delay.feedback = value,
            ("compressor", "enabled") => self.compressor.enabled = value != 0.0,
            ("compressor", "threshold_db") => self.compressor.threshold_db = value,
            ("compressor", "ratio") => self.compressor.ratio = value,
            _ => return Err(unknown()),
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, effect: &str, enabled: bool) -> Result<(), EngineError> {
        self.set(effect, "enabled", if enabled { 1.0 } else { 0.0 })
    }

    pub fn any_enabled(&self) -> bool {
        self.distortion.enabled
            || self.chorus.enabled
            || self.reverb.enabled
            || self.delay.enabled
            || self.compressor.enabled
    }
}

// -----------------------------------------------------------------------------
// Backend strategy
// -----------------------------------------------------------------------------

/// Processing backend for the chain. Selected once at construction; the
/// engine never switches backends mid-stream.
pub trait ChainBackend: Send {
    /// Re-instantiate the chain from the current parameters. Only enabled
    /// effects carry any state.
    fn rebuild(&mut self, params: &EffectsParams, sample_rate: f32);

    fn process(&mut self, audio: &mut [f32]) -> Result<(), DspError>;

    /// Channel count of the backend's output. Anything above 1 is averaged
    /// down to mono by the engine.
    fn output_channels(&self) -> usize {
        1
    }

    fn reset(&mut self);
}

/// Negotiate a backend once at startup. No native DSP library binding exists
/// for this platform yet, so the probe always lands on the builtin units.
fn negotiate_backend() -> Box<dyn ChainBackend> {
    Box::new(BuiltinBackend::new())
}

// -----------------------------------------------------------------------------
// Builtin effect units (mono)
// -----------------------------------------------------------------------------

/// Drive into a hard clip at full scale.
struct Distortion {
    drive: f32,
}

impl Distortion {
    fn new(p: &DistortionParams) -> Self {
        // Unity gain at 0 dB; negative drive must never invert the signal.
        Self {
            drive: 1.0 + p.drive_db.clamp(0.0, 40.0) / 20.0,
        }
    }

    fn process(&mut self, audio: &mut [f32]) {
        for s in audio.iter_mut() {
            *s = (*s * self.drive).clamp(-1.0, 1.0);
        }
    }
}

/// LFO-modulated delay line, mono.
struct Chorus {
    buffer: Vec<f32>,
    write_pos: usize,
    phase: f32,
    rate_hz: f32,
    depth_samples: f32,
    base_delay_samples: f32,
    sample_rate: f32,
}

impl Chorus {
    // Base delay 15 ms, max modulation 5 ms: buffer sized for both.
    const BASE_DELAY_SEC: f32 = 0.015;
    const MAX_DEPTH_SEC: f32 = 0.005;

    fn new(p: &ChorusParams, sample_rate: f32) -> Self {
        let max = ((Self::BASE_DELAY_SEC + Self::MAX_DEPTH_SEC) * sample_rate) as usize + 2;
        Self {
            buffer: vec![0.0; max],
            write_pos: 0,
            phase: 0.0,
            rate_hz: p.rate_hz.clamp(0.1, 10.0),
            depth_samples: p.depth.clamp(0.0, 1.0) * Self::MAX_DEPTH_SEC * sample_rate,
            base_delay_samples: Self::BASE_DELAY_SEC * sample_rate,
            sample_rate,
        }
    }

    fn read_interpolated(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let delay_int = delay_samples as usize;
        let frac = delay_samples - delay_int as f32;
        let pos0 = (self.write_pos + len - delay_int % len) % len;
        let pos1 = (pos0 + len - 1) % len;
        self.buffer[pos0] * (1.0 - frac) + self.buffer[pos1] * frac
    }

    fn process(&mut self, audio: &mut [f32]) {
        let phase_inc = self.rate_hz / self.sample_rate;
        for s in audio.iter_mut() {
            let lfo = (self.phase * 2.0 * std::f32::consts::PI).sin();
            let delay = self.base_delay_samples + lfo * self.depth_samples;
            let wet = self.read_interpolated(delay.max(1.0));

            self.buffer[self.write_pos] = *s;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();

            self.phase += phase_inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            *s = 0.5 * *s + 0.5 * wet;
        }
    }
}

/// Schroeder-style reverb: parallel damped combs into series allpasses.
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp: f32,
    filter_store: f32,
}

impl Comb {
    fn new(size: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
            feedback,
            damp,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.index];
        // Lowpass the feedback path (damping).
        self.filter_store = out * (1.0 - self.damp) + self.filter_store * self.damp;
        self.buffer[self.index] = input + self.filter_store * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

struct Allpass {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
            feedback: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let out = delayed - input;
        self.buffer[self.index] = input + delayed * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    wet: f32,
}

impl Reverb {
    // Classic mutually-prime comb lengths at 44.1 kHz.
    const COMB_SIZES: [usize; 4] = [1116, 1188, 1277, 1356];
    const ALLPASS_SIZES: [usize; 2] = [556, 441];

    fn new(p: &ReverbParams) -> Self {
        let feedback = 0.7 + 0.28 * p.room_size.clamp(0.0, 1.0);
        Self {
            combs: Self::COMB_SIZES
                .iter()
                .map(|&n| Comb::new(n, feedback, 0.2))
                .collect(),
            allpasses: Self::ALLPASS_SIZES.iter().map(|&n| Allpass::new(n)).collect(),
            wet: p.wet_level.clamp(0.0, 1.0),
        }
    }

    fn process(&mut self, audio: &mut [f32]) {
        for s in audio.iter_mut() {
            let input = *s;
            let mut wet = 0.0;
            for comb in &mut self.combs {
                wet += comb.process(input);
            }
            wet *= 0.25;
            for ap in &mut self.allpasses {
                wet = ap.process(wet);
            }
            *s = input * (1.0 - self.wet) + wet * self.wet;
        }
    }
}

/// Feedback echo.
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
}

impl DelayLine {
    const MAX_DELAY_SEC: f32 = 2.0;

    fn new(p: &DelayParams, sample_rate: f32) -> Self {
        let max = (Self::MAX_DELAY_SEC * sample_rate) as usize + 1;
        let delay_samples = ((p.time.max(0.0) * sample_rate) as usize).clamp(1, max - 1);
        Self {
            buffer: vec![0.0; max],
            write_pos: 0,
            delay_samples,
            feedback: p.feedback.clamp(0.0, 0.95),
        }
    }

    fn process(&mut self, audio: &mut [f32]) {
        let len = self.buffer.len();
        for s in audio.iter_mut() {
            let read_pos = (self.write_pos + len - self.delay_samples) % len;
            let delayed = self.buffer[read_pos];
            let out = *s + delayed * self.feedback;
            self.buffer[self.write_pos] = out;
            self.write_pos = (self.write_pos + 1) % len;
            *s = out;
        }
    }
}

/// Feed-forward compressor with envelope follower.
struct CompressorFx {
    threshold: f32,
    ratio: f32,
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl CompressorFx {
    fn new(p: &CompressorParams, sample_rate: f32) -> Self {
        let attack_sec = 0.003;
        let release_sec = 0.25;
        Self {
            threshold: db_to_gain(p.threshold_db.clamp(-60.0, 0.0)),
            ratio: p.ratio.clamp(1.0, 20.0),
            envelope: 0.0,
            attack_coeff: (-1.0 / (attack_sec * sample_rate)).exp(),
            release_coeff: (-1.0 / (release_sec * sample_rate)).exp(),
        }
    }

    fn process(&mut self, audio: &mut [f32]) {
        for s in audio.iter_mut() {
            let level = s.abs();
            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = level + coeff * (self.envelope - level);

            if self.envelope > self.threshold {
                let over = self.envelope / self.threshold;
                let gain = over.powf(1.0 / self.ratio - 1.0);
                *s *= gain;
            }
        }
    }
}

enum EffectUnit {
    Distortion(Distortion),
    Chorus(Chorus),
    Reverb(Reverb),
    Delay(DelayLine),
    Compressor(CompressorFx),
}

impl EffectUnit {
    fn process(&mut self, audio: &mut [f32]) {
        match self {
            EffectUnit::Distortion(fx) => fx.process(audio),
            EffectUnit::Chorus(fx) => fx.process(audio),
            EffectUnit::Reverb(fx) => fx.process(audio),
            EffectUnit::Delay(fx) => fx.process(audio),
            EffectUnit::Compressor(fx) => fx.process(audio),
        }
    }
}

/// The self-contained fallback backend.
struct BuiltinBackend {
    units: Vec<EffectUnit>,
}

impl BuiltinBackend {
    fn new() -> Self {
        Self { units: Vec::new() }
    }
}

impl ChainBackend for BuiltinBackend {
    fn rebuild(&mut self, params: &EffectsParams, sample_rate: f32) {
        self.units.clear();
        if params.distortion.enabled {
            self.units
                .push(EffectUnit::Distortion(Distortion::new(&params.distortion)));
        }
        if params.chorus.enabled {
            self.units
                .push(EffectUnit::Chorus(Chorus::new(&params.chorus, sample_rate)));
        }
        if params.reverb.enabled {
            self.units.push(EffectUnit::Reverb(Reverb::new(&params.reverb)));
        }
        if params.delay.enabled {
            self.units
                .push(EffectUnit::Delay(DelayLine::new(&params.delay, sample_rate)));
        }
        if params.compressor.enabled {
            self.units.push(EffectUnit::Compressor(CompressorFx::new(
                &params.compressor,
                sample_rate,
            )));
        }
    }

    fn process(&mut self, audio: &mut [f32]) -> Result<(), DspError> {
        for unit in &mut self.units {
            unit.process(audio);
        }
        Ok(())
    }

    fn reset(&mut self) {
        // Drop all delay/feedback state; rebuild happens on the next
        // parameter sync.
        self.units.clear();
    }
}

// -----------------------------------------------------------------------------
// Chain
// -----------------------------------------------------------------------------

pub struct EffectsChain {
    enabled: bool,
    params: EffectsParams,
    backend: Box<dyn ChainBackend>,
    sample_rate: f32,
}

impl EffectsChain {
    pub fn new() -> Self {
        Self::with_backend(negotiate_backend())
    }

    pub fn with_backend(backend: Box<dyn ChainBackend>) -> Self {
        let mut chain = Self {
            enabled: true,
            params: EffectsParams::default(),
            backend,
            sample_rate: SAMPLE_RATE as f32,
        };
        chain.backend.rebuild(&chain.params, chain.sample_rate);
        chain
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn params(&self) -> &EffectsParams {
        &self.params
    }

    /// Merge one field into one effect and rebuild the chain.
    pub fn update(&mut self, effect: &str, field: &str, value: f32) -> Result<(), EngineError> {
        self.params.set(effect, field, value)?;
        self.backend.rebuild(&self.params, self.sample_rate);
        Ok(())
    }

    /// Replace the whole parameter set (engine generation sync). Rebuilds
    /// only when something actually changed.
    pub fn set_params(&mut self, params: &EffectsParams) {
        if *params != self.params {
            self.params = *params;
            self.backend.rebuild(&self.params, self.sample_rate);
        }
    }

    pub fn output_channels(&self) -> usize {
        self.backend.output_channels()
    }

    /// Run the chain. When disabled, or when no effect is enabled, the input
    /// vector is returned untouched with no copy. Backend failures (including
    /// non-finite output) degrade to passthrough.
    pub fn process(&mut self, audio: Vec<f32>) -> Vec<f32> {
        if !self.enabled || !self.params.any_enabled() {
            return audio;
        }

        let mut out = audio.clone();
        match self.backend.process(&mut out) {
            Ok(()) if out.iter().all(|s| s.is_finite()) => out,
            Ok(()) => {
                error!("effects backend produced non-finite output, passing through");
                audio
            }
            Err(e) => {
                error!("effects backend failed: {e}, passing through");
                audio
            }
        }
    }

    pub fn reset(&mut self) {
        self.backend.reset();
        self.backend.rebuild(&self.params, self.sample_rate);
    }
}

impl Default for EffectsChain {
    fn default() -> Self {
        Self::new()
    }
}
