//! The voice engine: capture, processing worker, monitor worker, playback.
//!
//! `start()` opens both device streams and spawns two workers. The processing
//! worker owns all DSP state and pulls parameter snapshots from a shared
//! `RwLock` each chunk, so the control thread can retune the voice while
//! audio flows. The monitor worker samples process CPU/RAM once a second.
//! `stop()` tears everything down with bounded joins; a worker that will not
//! exit in time is abandoned rather than hanging the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use sysinfo::System;

use crate::capture::{CaptureReader, CaptureSource};
use crate::config::{
    CHUNK_SIZE, CROSSFADE_LEN, MAX_LATENCY_MS, MONITOR_JOIN_TIMEOUT, PROCESS_JOIN_TIMEOUT,
    READ_TIMEOUT, RING_CHUNKS, SAMPLE_RATE,
};
use crate::device::DeviceKind;
use crate::dsp::utils::downmix;
use crate::dsp::{
    BeautifySettings, CrossfadeBuffer, EffectsChain, EffectsParams, FormantShifter, Intensity,
    NoiseSuppressor, PitchShifter, VoiceEnhancer,
};
use crate::error::{DspError, EngineError, ErrorTracker};
use crate::output::{OutputSink, OutputWriter};
use crate::preset::Preset;
use crate::slots::SlotManager;
use crate::stats::{Stats, StatsSnapshot};

const RAM_WARN_MB: f32 = 500.0;
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const MONITOR_STEP: Duration = Duration::from_millis(100);
const PEAK_LOG_EVERY: u64 = 100;

/// A dynamically typed parameter value for the string-keyed update surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
}

impl ParamValue {
    fn as_f32(self) -> f32 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn as_bool(self) -> bool {
        match self {
            ParamValue::Bool(b) => b,
            ParamValue::Float(v) => v != 0.0,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v as f32)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// The complete tunable state of the voice. The worker snapshots this once
/// per chunk; `effects_generation` bumps whenever an effect parameter
/// changes so the worker knows to rebuild its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineParams {
    pub pitch_shift: f32,
    pub formant_ratio: f32,
    pub bypass: bool,
    pub volume: f32,
    pub effects: EffectsParams,
    pub effects_generation: u64,
    pub noise_enabled: bool,
    pub noise_intensity: Intensity,
    pub beautify: BeautifySettings,
    pub beautify_bypass: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            pitch_shift: 0.0,
            formant_ratio: 1.0,
            bypass: false,
            volume: 1.0,
            effects: EffectsParams::default(),
            effects_generation: 0,
            noise_enabled: false,
            noise_intensity: Intensity::Medium,
            beautify: BeautifySettings::default(),
            beautify_bypass: false,
        }
    }
}

impl EngineParams {
    /// Apply one named update. Effect parameters use the
    /// `effect:<name>:<field>` form.
    pub fn update(&mut self, name: &str, value: ParamValue) -> Result<(), EngineError> {
        match name {
            "pitch_shift" => self.pitch_shift = value.as_f32(),
            "formant_ratio" => self.formant_ratio = value.as_f32(),
            "bypass" => self.bypass = value.as_bool(),
            "volume" => self.volume = value.as_f32().clamp(0.0, 2.0),
            "noise_enabled" => self.noise_enabled = value.as_bool(),
            "beautify_enabled" => self.beautify.enabled = value.as_bool(),
            "beautify_bypass" => self.beautify_bypass = value.as_bool(),
            "beautify_deesser" => {
                self.beautify.deesser_strength = value.as_f32();
                self.beautify = self.beautify.validate();
            }
            "beautify_warmth" => {
                self.beautify.warmth = value.as_f32();
                self.beautify = self.beautify.validate();
            }
            "beautify_presence" => {
                self.beautify.presence = value.as_f32();
                self.beautify = self.beautify.validate();
            }
            _ => {
                let mut parts = name.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("effect"), Some(effect), Some(field)) => {
                        self.effects.set(effect, field, value.as_f32())?;
                        self.effects_generation += 1;
                    }
                    _ => return Err(EngineError::UnknownParam(name.to_string())),
                }
            }
        }
        Ok(())
    }
}

/// All DSP state, owned by the processing worker.
struct Pipeline {
    pitch: PitchShifter,
    formant: FormantShifter,
    effects: EffectsChain,
    suppressor: NoiseSuppressor,
    enhancer: VoiceEnhancer,
    crossfade: CrossfadeBuffer,
    slots: Arc<SlotManager>,
    last_effects_generation: u64,
    noise_was_enabled: bool,
}

impl Pipeline {
    fn new(slots: Arc<SlotManager>) -> Self {
        Self {
            pitch: PitchShifter::new(),
            formant: FormantShifter::new(),
            effects: EffectsChain::new(),
            suppressor: NoiseSuppressor::new(),
            enhancer: VoiceEnhancer::new(),
            crossfade: CrossfadeBuffer::new(CROSSFADE_LEN, CHUNK_SIZE * RING_CHUNKS),
            slots,
            last_effects_generation: 0,
            noise_was_enabled: false,
        }
    }

    /// Sync worker-owned state with the latest parameter snapshot.
    fn sync(&mut self, params: &EngineParams) {
        if params.effects_generation != self.last_effects_generation {
            self.effects.set_params(&params.effects);
            self.last_effects_generation = params.effects_generation;
        }

        // Enable only on the off-to-on edge so a re-sent `true` does not
        // defeat the failure latch.
        if params.noise_enabled && !self.noise_was_enabled {
            self.suppressor.enable();
        } else if !params.noise_enabled && self.noise_was_enabled {
            self.suppressor.disable();
        }
        self.noise_was_enabled = params.noise_enabled;
        self.suppressor.set_intensity(params.noise_intensity);

        self.enhancer.set_settings(params.beautify);
        self.enhancer.set_bypass(params.beautify_bypass);
    }

    /// Run one chunk through the full voice pipeline. Bypass short-circuits
    /// everything; volume applies either way.
    fn process_chunk(
        &mut self,
        chunk: Vec<f32>,
        params: &EngineParams,
    ) -> Result<Vec<f32>, DspError> {
        self.sync(params);

        let mut audio = if params.bypass {
            chunk
        } else {
            let shifted = self.pitch.process(&chunk, params.pitch_shift);
            let shifted = self.formant.process(&shifted, params.formant_ratio);
            let mut wet = self.effects.process(shifted);
            let channels = self.effects.output_channels();
            if channels > 1 {
                wet = downmix(&wet, channels);
            }
            let wet = self.suppressor.process(wet);
            let wet = self.enhancer.process(wet);
            let mut wet = self.crossfade.apply(wet);
            self.slots.apply_crossfade(&mut wet);
            wet
        };

        if (params.volume - 1.0).abs() > f32::EPSILON {
            for s in audio.iter_mut() {
                *s *= params.volume;
            }
        }

        if audio.iter().any(|s| !s.is_finite()) {
            return Err(DspError::NonFinite("pipeline output"));
        }
        Ok(audio)
    }

    fn reset(&mut self) {
        self.pitch.reset();
        self.formant.reset();
        self.effects.reset();
        self.enhancer.reset();
        self.crossfade.clear();
    }
}

pub struct Engine {
    capture: CaptureSource,
    output: OutputSink,
    params: Arc<RwLock<EngineParams>>,
    stats: Arc<Stats>,
    slots: Arc<SlotManager>,
    stop_flag: Arc<AtomicBool>,
    process_worker: Option<JoinHandle<()>>,
    monitor_worker: Option<JoinHandle<()>>,
    running: bool,
}

impl Engine {
    pub fn new() -> Self {
        let stats = Arc::new(Stats::new());
        Self {
            capture: CaptureSource::new(Arc::clone(&stats)),
            output: OutputSink::new(Arc::clone(&stats)),
            params: Arc::new(RwLock::new(EngineParams::default())),
            stats,
            slots: Arc::new(SlotManager::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            process_worker: None,
            monitor_worker: None,
            running: false,
        }
    }

    /// Select a device for the next `start()`.
    pub fn set_device(&mut self, kind: DeviceKind, device_id: Option<String>) {
        match kind {
            DeviceKind::Input => self.capture.set_device(device_id),
            DeviceKind::Output => self.output.set_device(device_id),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Open both streams and spawn the workers. On any failure everything
    /// already started is torn back down before the error propagates.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            return Ok(());
        }
        info!("starting voice engine");
        self.stats.reset();
        self.stop_flag.store(false, Ordering::Relaxed);

        self.capture.start()?;
        if let Err(e) = self.output.start() {
            error!("output failed to start: {e}");
            self.capture.stop();
            return Err(e);
        }

        let reader = self.capture.reader();
        let writer = self.output.writer();
        let pipeline = Pipeline::new(Arc::clone(&self.slots));
        let params = Arc::clone(&self.params);
        let stats = Arc::clone(&self.stats);
        let stop = Arc::clone(&self.stop_flag);
        self.process_worker = Some(
            thread::Builder::new()
                .name("vxshift-process".into())
                .spawn(move || process_loop(reader, writer, pipeline, params, stats, stop))?,
        );

        let stats = Arc::clone(&self.stats);
        let stop = Arc::clone(&self.stop_flag);
        self.monitor_worker = Some(
            thread::Builder::new()
                .name("vxshift-monitor".into())
                .spawn(move || monitor_loop(stats, stop))?,
        );

        self.running = true;
        Ok(())
    }

    /// Stop the streams and join the workers, abandoning any worker that
    /// exceeds its join timeout.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        info!("stopping voice engine");
        self.stop_flag.store(true, Ordering::Relaxed);
        self.capture.stop();
        self.output.stop();

        join_bounded(self.process_worker.take(), PROCESS_JOIN_TIMEOUT, "process");
        join_bounded(self.monitor_worker.take(), MONITOR_JOIN_TIMEOUT, "monitor");
        self.running = false;
    }

    /// Apply one named parameter update, visible to the worker on its next
    /// chunk.
    pub fn update_param(
        &self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), EngineError> {
        self.params.write().update(name, value.into())
    }

    /// Load a complete preset, replacing pitch, formant, and all effect
    /// settings.
    pub fn apply_preset(&self, preset: &Preset) -> Result<(), EngineError> {
        let mut params = self.params.write();
        params.pitch_shift = preset.pitch_shift;
        params.formant_ratio = preset.formant_ratio;
        params.effects = EffectsParams::default();
        for (effect, settings) in &preset.effects {
            params.effects.set_enabled(effect, settings.enabled)?;
            for (field, &value) in &settings.fields {
                params.effects.set(effect, field, value)?;
            }
        }
        params.effects_generation += 1;
        Ok(())
    }

    /// Set the noise suppression intensity by name (`light`, `medium`,
    /// `aggressive`). Unknown names are logged and ignored.
    pub fn set_noise_intensity(&self, name: &str) {
        match Intensity::parse(name) {
            Some(intensity) => {
                self.params.write().noise_intensity = intensity;
                info!("noise intensity set to {}", intensity.name());
            }
            None => warn!("unknown noise intensity '{name}', keeping current setting"),
        }
    }

    pub fn params(&self) -> EngineParams {
        self.params.read().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_bounded(handle: Option<JoinHandle<()>>, timeout: Duration, name: &str) {
    let Some(handle) = handle else {
        return;
    };
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} worker did not stop within {timeout:?}, abandoning");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}

fn process_loop(
    reader: CaptureReader,
    writer: OutputWriter,
    mut pipeline: Pipeline,
    params: Arc<RwLock<EngineParams>>,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
) {
    let tracker = ErrorTracker::new();
    let chunk_ms = CHUNK_SIZE as f32 / SAMPLE_RATE as f32 * 1000.0;
    let mut frames: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        let chunk = match reader.read(READ_TIMEOUT) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let started = Instant::now();
        let snapshot = params.read().clone();
        match pipeline.process_chunk(chunk, &snapshot) {
            Ok(audio) => {
                frames += 1;
                if frames % PEAK_LOG_EVERY == 0 {
                    let peak = audio.iter().fold(0.0f32, |p, &s| p.max(s.abs()));
                    debug!("frame {frames}: peak {peak:.3}");
                }

                let latency = started.elapsed().as_secs_f32() * 1000.0
                    + writer.queued() as f32 * chunk_ms;
                stats.set_latency_ms(latency);
                if latency > MAX_LATENCY_MS {
                    warn!("latency {latency:.0} ms exceeds budget");
                }

                writer.write(audio);
            }
            Err(e) => {
                tracker.record("process-loop", &e.to_string());
                pipeline.reset();
                writer.write(vec![0.0; CHUNK_SIZE]);
            }
        }
    }
    debug!("process worker exiting after {frames} frames");
}

fn monitor_loop(stats: Arc<Stats>, stop: Arc<AtomicBool>) {
    // fps is fixed by the stream shape and needs no process handle.
    stats.set_fps(SAMPLE_RATE as f32 / CHUNK_SIZE as f32);

    let mut system = System::new();
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            warn!("monitor disabled, cannot resolve pid: {e}");
            return;
        }
    };

    let mut next_sample = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(MONITOR_STEP);
        if Instant::now() < next_sample {
            continue;
        }
        next_sample = Instant::now() + MONITOR_INTERVAL;

        system.refresh_process(pid);
        if let Some(proc_) = system.process(pid) {
            let ram_mb = proc_.memory() as f32 / (1024.0 * 1024.0);
            stats.set_cpu_percent(proc_.cpu_usage());
            stats.set_ram_mb(ram_mb);
            if ram_mb > RAM_WARN_MB {
                warn!("resident memory {ram_mb:.0} MB");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| 0.4 * (i as f32 * 0.03).sin()).collect()
    }

    #[test]
    fn test_param_updates_route() {
        let mut params = EngineParams::default();
        params.update("pitch_shift", ParamValue::Float(5.0)).unwrap();
        params.update("bypass", ParamValue::Bool(true)).unwrap();
        params.update("volume", ParamValue::Float(1.5)).unwrap();
        params
            .update("effect:reverb:enabled", ParamValue::Float(1.0))
            .unwrap();
        params
            .update("effect:reverb:wet_level", ParamValue::Float(0.6))
            .unwrap();
        params
            .update("beautify_warmth", ParamValue::Float(4.0))
            .unwrap();

        assert_eq!(params.pitch_shift, 5.0);
        assert!(params.bypass);
        assert_eq!(params.volume, 1.5);
        assert!(params.effects.reverb.enabled);
        assert_eq!(params.effects.reverb.wet_level, 0.6);
        assert_eq!(params.beautify.warmth, 4.0);
        assert_eq!(params.effects_generation, 2);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut params = EngineParams::default();
        assert!(params.update("reverb_level", ParamValue::Float(0.5)).is_err());
        assert!(params
            .update("effect:reverb:sparkle", ParamValue::Float(0.5))
            .is_err());
    }

    #[test]
    fn test_volume_clamped() {
        let mut params = EngineParams::default();
        params.update("volume", ParamValue::Float(9.0)).unwrap();
        assert_eq!(params.volume, 2.0);
    }

    #[test]
    fn test_bypass_is_bit_exact_at_unity_volume() {
        let mut pipeline = Pipeline::new(Arc::new(SlotManager::new()));
        let params = EngineParams {
            bypass: true,
            pitch_shift: 7.0,
            ..Default::default()
        };
        let input = tone(CHUNK_SIZE);
        let out = pipeline.process_chunk(input.clone(), &params).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_pipeline_active_changes_signal() {
        let mut pipeline = Pipeline::new(Arc::new(SlotManager::new()));
        let params = EngineParams {
            pitch_shift: 7.0,
            ..Default::default()
        };
        let input = tone(CHUNK_SIZE);
        let out = pipeline.process_chunk(input.clone(), &params).unwrap();
        assert_eq!(out.len(), input.len());
        assert_ne!(out, input);
    }

    #[test]
    fn test_volume_scales_bypass_output() {
        let mut pipeline = Pipeline::new(Arc::new(SlotManager::new()));
        let params = EngineParams {
            bypass: true,
            volume: 0.5,
            ..Default::default()
        };
        let input = vec![0.8; CHUNK_SIZE];
        let out = pipeline.process_chunk(input, &params).unwrap();
        assert!(out.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_apply_preset_replaces_effects() {
        let engine = Engine::new();
        engine.update_param("effect:delay:enabled", 1.0).unwrap();

        let preset = Preset::from_json(
            r#"{
                "pitch_shift": -3.0,
                "effects": {
                    "reverb": { "enabled": true, "room_size": 0.9 }
                }
            }"#,
        )
        .unwrap();
        engine.apply_preset(&preset).unwrap();

        let params = engine.params();
        assert_eq!(params.pitch_shift, -3.0);
        assert!(params.effects.reverb.enabled);
        assert_eq!(params.effects.reverb.room_size, 0.9);
        // Effects not named by the preset return to defaults.
        assert!(!params.effects.delay.enabled);
    }

    #[test]
    fn test_monitor_reports_fps_immediately() {
        let stats = Arc::new(Stats::new());
        let stop = Arc::new(AtomicBool::new(true));
        monitor_loop(Arc::clone(&stats), stop);
        let expected = SAMPLE_RATE as f32 / CHUNK_SIZE as f32;
        assert!((stats.snapshot().fps - expected).abs() < 1e-3);
    }

    #[test]
    fn test_noise_intensity_by_name() {
        let engine = Engine::new();
        engine.set_noise_intensity("aggressive");
        assert_eq!(engine.params().noise_intensity, Intensity::Aggressive);

        // Unknown names leave the setting alone.
        engine.set_noise_intensity("extreme");
        assert_eq!(engine.params().noise_intensity, Intensity::Aggressive);
    }

    #[test]
    fn test_sync_enables_noise_on_edge_only() {
        let mut pipeline = Pipeline::new(Arc::new(SlotManager::new()));
        let mut params = EngineParams::default();

        params.noise_enabled = true;
        pipeline.sync(&params);
        assert!(pipeline.suppressor.is_enabled());

        params.noise_enabled = false;
        pipeline.sync(&params);
        assert!(!pipeline.suppressor.is_enabled());
    }
}
