//! Thread-safe performance statistics.
//!
//! Atomic storage shared between the processing worker, the device callbacks
//! and the monitor worker without locks. Counters reset on engine start and
//! grow monotonically while running; collaborators read a point-in-time
//! [`StatsSnapshot`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// f32 stored as its bit pattern in an `AtomicU32`.
#[derive(Default)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn set(&self, val: f32) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Rolling engine statistics.
#[derive(Default)]
pub struct Stats {
    latency_ms: AtomicF32,
    cpu_percent: AtomicF32,
    ram_mb: AtomicF32,
    fps: AtomicF32,
    dropped_frames: AtomicU64,
    underflows: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.latency_ms.set(0.0);
        self.cpu_percent.set(0.0);
        self.ram_mb.set(0.0);
        self.fps.set(0.0);
        self.dropped_frames.store(0, Ordering::Relaxed);
        self.underflows.store(0, Ordering::Relaxed);
    }

    pub fn set_latency_ms(&self, val: f32) {
        self.latency_ms.set(val);
    }

    pub fn set_cpu_percent(&self, val: f32) {
        self.cpu_percent.set(val);
    }

    pub fn set_ram_mb(&self, val: f32) {
        self.ram_mb.set(val);
    }

    pub fn set_fps(&self, val: f32) {
        self.fps.set(val);
    }

    /// Increment the dropped-input-frame counter, returning the new total.
    pub fn record_dropped_frame(&self) -> u64 {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Increment the output-underflow counter, returning the new total.
    pub fn record_underflow(&self) -> u64 {
        self.underflows.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            latency_ms: self.latency_ms.get(),
            cpu_percent: self.cpu_percent.get(),
            ram_mb: self.ram_mb.get(),
            fps: self.fps.get(),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            underflows: self.underflows.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of the engine statistics at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub latency_ms: f32,
    pub cpu_percent: f32,
    pub ram_mb: f32,
    pub fps: f32,
    pub dropped_frames: u64,
    pub underflows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = Stats::new();
        assert_eq!(stats.record_dropped_frame(), 1);
        assert_eq!(stats.record_dropped_frame(), 2);
        assert_eq!(stats.record_underflow(), 1);
        stats.set_latency_ms(12.5);

        let snap = stats.snapshot();
        assert_eq!(snap.dropped_frames, 2);
        assert_eq!(snap.underflows, 1);
        assert!((snap.latency_ms - 12.5).abs() < 1e-6);

        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.dropped_frames, 0);
        assert_eq!(snap.latency_ms, 0.0);
    }
}
