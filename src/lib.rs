//! Real-time voice transformation engine.
//!
//! Captures microphone audio, runs it through a configurable voice pipeline
//! (pitch, formant, effects, noise suppression, beautification) and plays the
//! result back with bounded latency. The [`Engine`] is the single entry
//! point; everything else hangs off it.
//!
//! ```no_run
//! use vxshift::Engine;
//!
//! let mut engine = Engine::new();
//! engine.update_param("pitch_shift", -4.0)?;
//! engine.update_param("effect:reverb:enabled", 1.0)?;
//! engine.start()?;
//! # Ok::<(), vxshift::EngineError>(())
//! ```

pub mod config;
pub mod dsp;

mod capture;
mod device;
mod engine;
mod error;
mod output;
mod preset;
mod slots;
mod stats;

pub use capture::CaptureSource;
pub use device::DeviceKind;
pub use engine::{Engine, EngineParams, ParamValue};
pub use error::{DspError, EngineError, ErrorTracker};
pub use output::OutputSink;
pub use preset::{EffectPreset, Preset};
pub use slots::{SlotManager, SlotStatus};
pub use stats::{Stats, StatsSnapshot};
