//! Microphone capture.
//!
//! The cpal input callback applies the fixed gain stage and pushes whole
//! chunks into a bounded channel with a drop-oldest overflow policy, so the
//! device callback never blocks and the processing worker always sees the
//! freshest audio available.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{error, info, warn};

use crate::config::{CAPTURE_GAIN, FLOW_LOG_EVERY, MAX_INPUT_QUEUE};
use crate::device::{find_device, stream_config, DeviceKind};
use crate::error::EngineError;
use crate::dsp::utils::soft_clip;
use crate::stats::Stats;

/// Boost quiet microphone input and soft-clip the result back into range.
fn gain_stage(samples: &[f32]) -> Vec<f32> {
    samples.iter().map(|&s| soft_clip(s * CAPTURE_GAIN)).collect()
}

/// Push a frame, evicting the oldest queued frame when full. Logs every Nth
/// drop so a persistently slow consumer is visible without flooding.
fn push_with_drop(tx: &Sender<Vec<f32>>, rx: &Receiver<Vec<f32>>, frame: Vec<f32>, stats: &Stats) {
    match tx.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            let _ = rx.try_recv();
            let dropped = stats.record_dropped_frame();
            if dropped % FLOW_LOG_EVERY == 1 {
                warn!("input queue full, dropped oldest frame (total {dropped})");
            }
            if tx.try_send(frame).is_err() {
                stats.record_dropped_frame();
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Handle the processing worker reads captured frames from.
pub struct CaptureReader {
    rx: Receiver<Vec<f32>>,
}

impl CaptureReader {
    pub fn read(&self, timeout: Duration) -> Result<Vec<f32>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub struct CaptureSource {
    device_id: Option<String>,
    tx: Sender<Vec<f32>>,
    rx: Receiver<Vec<f32>>,
    stream: Option<cpal::Stream>,
    running: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl CaptureSource {
    pub fn new(stats: Arc<Stats>) -> Self {
        let (tx, rx) = bounded(MAX_INPUT_QUEUE);
        Self {
            device_id: None,
            tx,
            rx,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    /// Select the capture device for the next `start()`. `None` means the
    /// host default.
    pub fn set_device(&mut self, device_id: Option<String>) {
        self.device_id = device_id;
    }

    pub fn reader(&self) -> CaptureReader {
        CaptureReader {
            rx: self.rx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Open the input device and start capturing. Frames captured before a
    /// previous stop are discarded first.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Ok(());
        }
        while self.rx.try_recv().is_ok() {}

        let host = cpal::default_host();
        let device = find_device(&host, DeviceKind::Input, self.device_id.as_deref())?;
        info!(
            "capture device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let tx = self.tx.clone();
        let rx = self.rx.clone();
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let stream = device.build_input_stream(
            &stream_config(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                push_with_drop(&tx, &rx, gain_stage(data), &stats);
            },
            |e| error!("capture stream error: {e}"),
            None,
        )?;

        self.running.store(true, Ordering::Relaxed);
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if self.stream.take().is_some() {
            info!("capture stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_stage_boosts_and_bounds() {
        let out = gain_stage(&[0.01, 0.5, -0.9]);
        // Quiet input boosted roughly linearly.
        assert!((out[0] - 0.0999).abs() < 1e-3);
        // Hot input saturates inside (-1, 1).
        assert!(out[1] < 1.0 && out[1] > 0.99);
        assert!(out[2] > -1.0 && out[2] < -0.99);
    }

    #[test]
    fn test_push_drops_oldest_when_full() {
        let stats = Stats::new();
        let (tx, rx) = bounded(3);
        for i in 0..3 {
            push_with_drop(&tx, &rx, vec![i as f32], &stats);
        }
        assert_eq!(tx.len(), 3);

        push_with_drop(&tx, &rx, vec![99.0], &stats);
        assert_eq!(tx.len(), 3);
        assert_eq!(stats.snapshot().dropped_frames, 1);

        // Oldest frame is gone, newest made it in.
        assert_eq!(rx.try_recv().unwrap(), vec![1.0]);
        assert_eq!(rx.try_recv().unwrap(), vec![2.0]);
        assert_eq!(rx.try_recv().unwrap(), vec![99.0]);
    }

    #[test]
    fn test_reader_times_out_when_idle() {
        let stats = Arc::new(Stats::new());
        let source = CaptureSource::new(stats);
        let reader = source.reader();
        assert!(matches!(
            reader.read(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        ));
    }
}
