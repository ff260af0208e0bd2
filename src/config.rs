//! Audio constants and policy bounds for the engine.
//!
//! Everything here is fixed at compile time: the pipeline runs at one sample
//! rate and one block size, and the queue depths encode the latency budget.

use std::time::Duration;

// Stream shape. The whole pipeline assumes mono f32 at this rate/block size.
pub const SAMPLE_RATE: u32 = 44_100;
pub const CHUNK_SIZE: usize = 1024;
pub const CHANNELS: u16 = 1;

// Queue management.
// Input stays shallow so stale microphone data is dropped quickly; output is
// deeper to absorb processing jitter, with a watermark the catch-up drain
// targets when latency builds up.
pub const MAX_INPUT_QUEUE: usize = 5;
pub const MAX_OUTPUT_QUEUE: usize = 8;
pub const MIN_OUTPUT_QUEUE: usize = 3;

// Crossfade stitching between successive processed chunks.
pub const CROSSFADE_LEN: usize = 256;
// Backing ring capacity in chunks.
pub const RING_CHUNKS: usize = 30;

// Processing limits. Out-of-range factors are clamped, never rejected.
pub const PITCH_MIN: f32 = -12.0;
pub const PITCH_MAX: f32 = 12.0;
pub const FORMANT_MIN: f32 = 0.5;
pub const FORMANT_MAX: f32 = 2.0;
// Factors this close to neutral bypass the resampler entirely.
pub const PITCH_BYPASS_EPSILON: f32 = 0.1;
pub const FORMANT_BYPASS_EPSILON: f32 = 0.05;
// Intermediate resample lengths below this are numerically unsafe.
pub const MIN_RESAMPLE_LEN: usize = 10;

// Capture gain staging: fixed boost followed by tanh soft clipping.
pub const CAPTURE_GAIN: f32 = 10.0;

// Flow-control logging cadence: every Nth drop/underflow, not every one.
pub const FLOW_LOG_EVERY: u64 = 50;

// Bounded waits. Device callbacks never block; these apply to the worker.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(200);
pub const PROCESS_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);
pub const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

// Latency warning threshold for the monitor worker.
pub const MAX_LATENCY_MS: f32 = 200.0;

// Voice slots.
pub const SLOT_COUNT: usize = 5;
pub const SLOT_FADE_MS: f32 = 100.0;
