//! Speaker output.
//!
//! Processed chunks queue into a bounded channel the cpal output callback
//! drains. When the queue backs up past capacity the writer drains it down
//! to a low watermark before enqueueing, trading a momentary skip for bounded
//! latency. An empty queue at callback time emits silence and counts an
//! underflow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::{FLOW_LOG_EVERY, MAX_OUTPUT_QUEUE, MIN_OUTPUT_QUEUE, WRITE_TIMEOUT};
use crate::device::{find_device, stream_config, DeviceKind};
use crate::error::EngineError;
use crate::stats::Stats;

/// Handle the processing worker writes finished chunks through.
pub struct OutputWriter {
    tx: Sender<Vec<f32>>,
    rx: Receiver<Vec<f32>>,
    capacity: usize,
    min_level: usize,
}

impl OutputWriter {
    /// Queue a chunk for playback. Never fatal: a full queue is drained to
    /// the watermark first, and a device that still will not accept the
    /// chunk within the write timeout just loses it.
    pub fn write(&self, frame: Vec<f32>) {
        if self.tx.len() >= self.capacity {
            let mut drained = 0;
            while self.tx.len() > self.min_level && self.rx.try_recv().is_ok() {
                drained += 1;
            }
            if drained > 0 {
                debug!("output queue backlog, dropped {drained} stale chunks");
            }
        }

        match self.tx.send_timeout(frame, WRITE_TIMEOUT) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("output device not consuming, dropped one chunk");
            }
            Err(SendTimeoutError::Disconnected(_)) => {}
        }
    }

    /// Chunks currently queued for playback.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

pub struct OutputSink {
    device_id: Option<String>,
    tx: Sender<Vec<f32>>,
    rx: Receiver<Vec<f32>>,
    stream: Option<cpal::Stream>,
    running: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl OutputSink {
    pub fn new(stats: Arc<Stats>) -> Self {
        let (tx, rx) = bounded(MAX_OUTPUT_QUEUE);
        Self {
            device_id: None,
            tx,
            rx,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    pub fn set_device(&mut self, device_id: Option<String>) {
        self.device_id = device_id;
    }

    pub fn writer(&self) -> OutputWriter {
        OutputWriter {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: MAX_OUTPUT_QUEUE,
            min_level: MIN_OUTPUT_QUEUE,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Open the output device and start playback, discarding any chunks left
    /// over from a previous session.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Ok(());
        }
        while self.rx.try_recv().is_ok() {}

        let host = cpal::default_host();
        let device = find_device(&host, DeviceKind::Output, self.device_id.as_deref())?;
        info!(
            "output device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let rx = self.rx.clone();
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let stream = device.build_output_stream(
            &stream_config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }
                match rx.try_recv() {
                    Ok(frame) => {
                        let n = frame.len().min(data.len());
                        data[..n].copy_from_slice(&frame[..n]);
                        data[n..].fill(0.0);
                    }
                    Err(_) => {
                        data.fill(0.0);
                        let underflows = stats.record_underflow();
                        if underflows % FLOW_LOG_EVERY == 1 {
                            warn!("output underflow, playing silence (total {underflows})");
                        }
                    }
                }
            },
            |e| error!("output stream error: {e}"),
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
            info!("output stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer_with_capacity(capacity: usize, min_level: usize) -> OutputWriter {
        let (tx, rx) = bounded(capacity);
        OutputWriter {
            tx,
            rx,
            capacity,
            min_level,
        }
    }

    #[test]
    fn test_write_queues_until_capacity() {
        let writer = writer_with_capacity(5, 2);
        for i in 0..4 {
            writer.write(vec![i as f32]);
        }
        assert_eq!(writer.queued(), 4);
    }

    #[test]
    fn test_full_queue_drains_to_watermark() {
        let writer = writer_with_capacity(5, 2);
        for i in 0..5 {
            writer.write(vec![i as f32]);
        }
        assert_eq!(writer.queued(), 5);

        // Sixth write drains down to the watermark, then appends.
        writer.write(vec![99.0]);
        assert_eq!(writer.queued(), 3);

        // What remains is the newest pre-drain chunks plus the new one.
        assert_eq!(writer.rx.try_recv().unwrap(), vec![3.0]);
        assert_eq!(writer.rx.try_recv().unwrap(), vec![4.0]);
        assert_eq!(writer.rx.try_recv().unwrap(), vec![99.0]);
    }
}
