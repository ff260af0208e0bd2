//! Voice slot management.
//!
//! A fixed bank of voice slots the user flips between live. Switching while
//! a switch is already in flight queues the request, keeping only the latest
//! (intermediate targets are pointless to pass through). Each completed
//! switch arms a short crossfade the processing worker applies to the next
//! chunks so the change-over does not click.

use log::{info, warn};
use parking_lot::Mutex;

use crate::config::{SAMPLE_RATE, SLOT_COUNT, SLOT_FADE_MS};

struct SlotFade {
    total: usize,
    progress: usize,
}

struct SlotInner {
    labels: Vec<String>,
    current: usize,
    switching: bool,
    pending: Option<usize>,
    fade: Option<SlotFade>,
}

/// Point-in-time view of the slot bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub current: usize,
    pub switching: bool,
    pub pending: Option<usize>,
    pub labels: Vec<String>,
}

pub struct SlotManager {
    inner: Mutex<SlotInner>,
    slot_count: usize,
    fade_samples: usize,
}

impl SlotManager {
    pub fn new() -> Self {
        Self::with_slots(SLOT_COUNT)
    }

    pub fn with_slots(slot_count: usize) -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                labels: (0..slot_count).map(|i| format!("Voice {}", i + 1)).collect(),
                current: 0,
                switching: false,
                pending: None,
                fade: None,
            }),
            slot_count,
            fade_samples: (SLOT_FADE_MS / 1000.0 * SAMPLE_RATE as f32) as usize,
        }
    }

    /// Switch to `index`. Returns false when the index is invalid or the
    /// request was queued behind a switch already in flight. Queued requests
    /// keep only the most recent target and are drained iteratively once the
    /// active switch completes.
    pub fn switch_to(&self, index: usize) -> bool {
        {
            let mut inner = self.inner.lock();
            if index >= self.slot_count {
                warn!("ignoring switch to invalid slot {index}");
                return false;
            }
            if inner.switching {
                inner.pending = Some(index);
                return false;
            }
            inner.switching = true;
        }

        let mut target = index;
        loop {
            self.perform_switch(target);
            let mut inner = self.inner.lock();
            match inner.pending.take() {
                Some(next) if next != inner.current => target = next,
                _ => {
                    inner.switching = false;
                    return true;
                }
            }
        }
    }

    fn perform_switch(&self, index: usize) {
        let mut inner = self.inner.lock();
        let from = inner.current;
        inner.current = index;
        inner.fade = Some(SlotFade {
            total: self.fade_samples.max(1),
            progress: 0,
        });
        info!("switched voice slot {from} -> {index} ({})", inner.labels[index]);
    }

    /// Blend the chunk across the armed slot transition, advancing fade
    /// progress. No-op when no fade is in flight. Both fade legs read the
    /// same processed audio; the ramp shape is what masks the parameter
    /// discontinuity at the switch point.
    pub fn apply_crossfade(&self, chunk: &mut [f32]) {
        let mut inner = self.inner.lock();
        let Some(fade) = inner.fade.as_mut() else {
            return;
        };

        for s in chunk.iter_mut() {
            if fade.progress >= fade.total {
                break;
            }
            let t = fade.progress as f32 / fade.total as f32;
            *s = *s * (1.0 - t) + *s * t;
            fade.progress += 1;
        }

        if fade.progress >= fade.total {
            inner.fade = None;
        }
    }

    pub fn current(&self) -> usize {
        self.inner.lock().current
    }

    pub fn set_label(&self, index: usize, label: &str) {
        let mut inner = self.inner.lock();
        if index < self.slot_count {
            inner.labels[index] = label.to_string();
        } else {
            warn!("ignoring label for invalid slot {index}");
        }
    }

    pub fn label(&self, index: usize) -> Option<String> {
        self.inner.lock().labels.get(index).cloned()
    }

    pub fn status(&self) -> SlotStatus {
        let inner = self.inner.lock();
        SlotStatus {
            current: inner.current,
            switching: inner.switching,
            pending: inner.pending,
            labels: inner.labels.clone(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
}

impl Default for SlotManager {
    fn default() -> Self {
        Self::new()
    }
}
