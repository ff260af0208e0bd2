//! Error taxonomy and rate-limited error tracking.
//!
//! Fatal errors ([`EngineError`]) abort `start()` and surface to the caller.
//! Per-frame processing failures ([`DspError`]) are caught at each stage
//! boundary and degrade to passthrough; the [`ErrorTracker`] keeps repeated
//! failures from flooding the log.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;

/// Fatal engine errors. A failure to open or start a device stream means no
/// frames can flow, so these propagate out of `start()`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no {kind} device matching {query:?}")]
    DeviceNotFound { kind: &'static str, query: String },

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn worker thread: {0}")]
    Worker(#[from] std::io::Error),

    #[error("unknown parameter: {0}")]
    UnknownParam(String),
}

/// Per-frame processing failures. Never allowed past a stage boundary: the
/// stage logs and returns its input unmodified instead.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("resampler construction failed: {0}")]
    ResamplerBuild(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("non-finite sample produced by {0}")]
    NonFinite(&'static str),

    #[error("reduction backend failed: {0}")]
    Backend(String),
}

// Log the first N occurrences per source in full.
const LOG_FIRST: u64 = 3;
// After that, log only every Nth occurrence.
const LOG_EVERY: u64 = 10;
// A source quiet for this long gets its count reset.
const RESET_AFTER_SECS: u64 = 60;

#[derive(Clone, Copy)]
struct SourceRecord {
    count: u64,
    last_seen: Instant,
}

/// Tracks repeated errors per source and suppresses log flooding: the first
/// three occurrences are logged, then every tenth. Counts reset after a
/// minute of silence from that source.
pub struct ErrorTracker {
    sources: Mutex<HashMap<&'static str, SourceRecord>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Record an error from `source`, logging it unless suppressed.
    /// Returns the running count for that source.
    pub fn record(&self, source: &'static str, message: &str) -> u64 {
        let mut sources = self.sources.lock();
        let now = Instant::now();
        let record = sources.entry(source).or_insert(SourceRecord {
            count: 0,
            last_seen: now,
        });

        if now.duration_since(record.last_seen).as_secs() > RESET_AFTER_SECS {
            record.count = 0;
        }
        record.count += 1;
        record.last_seen = now;

        if record.count <= LOG_FIRST || record.count % LOG_EVERY == 0 {
            log::error!("[{source}] {message} (count: {})", record.count);
        }
        record.count
    }

    /// Total errors recorded for a source since its last reset.
    pub fn count(&self, source: &'static str) -> u64 {
        self.sources.lock().get(source).map_or(0, |r| r.count)
    }

    pub fn clear(&self) {
        self.sources.lock().clear();
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate_per_source() {
        let tracker = ErrorTracker::new();
        for _ in 0..5 {
            tracker.record("pitch", "boom");
        }
        tracker.record("output", "boom");
        assert_eq!(tracker.count("pitch"), 5);
        assert_eq!(tracker.count("output"), 1);
        assert_eq!(tracker.count("unknown"), 0);
    }

    #[test]
    fn test_clear_resets_counts() {
        let tracker = ErrorTracker::new();
        tracker.record("loop", "x");
        tracker.clear();
        assert_eq!(tracker.count("loop"), 0);
    }
}
