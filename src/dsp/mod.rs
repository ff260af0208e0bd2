//! Signal-processing stages for the voice pipeline.

pub mod biquad;
pub mod crossfade;
pub mod effects;
pub mod enhancer;
pub mod formant;
pub mod noise;
pub mod pitch;
pub mod resample;
pub mod utils;

pub use biquad::Biquad;
pub use crossfade::{CircularBuffer, CrossfadeBuffer};
pub use effects::{ChainBackend, EffectsChain, EffectsParams};
pub use enhancer::{BeautifySettings, VoiceEnhancer};
pub use formant::FormantShifter;
pub use noise::{Intensity, NoiseStats, NoiseSuppressor, ReductionBackend};
pub use pitch::PitchShifter;
pub use resample::resample_to;
