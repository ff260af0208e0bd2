//! Device resolution against the cpal host.
//!
//! Device selection is by an opaque identifier supplied by a collaborator
//! (the device enumerator): a case-insensitive name substring. No identifier
//! means the host default.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};

use crate::config::{CHANNELS, CHUNK_SIZE, SAMPLE_RATE};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Input,
    Output,
}

impl DeviceKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            DeviceKind::Input => "input",
            DeviceKind::Output => "output",
        }
    }
}

/// The fixed stream shape every device is opened with.
pub(crate) fn stream_config() -> StreamConfig {
    StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: BufferSize::Fixed(CHUNK_SIZE as u32),
    }
}

/// Resolve a device by identifier, falling back to the host default.
pub(crate) fn find_device(
    host: &cpal::Host,
    kind: DeviceKind,
    query: Option<&str>,
) -> Result<cpal::Device, EngineError> {
    if let Some(q) = query {
        let needle = q.to_lowercase();
        let devices: Box<dyn Iterator<Item = cpal::Device>> = match kind {
            DeviceKind::Input => Box::new(host.input_devices()?),
            DeviceKind::Output => Box::new(host.output_devices()?),
        };
        for device in devices {
            let name = device.name().unwrap_or_default();
            if name.to_lowercase().contains(&needle) {
                return Ok(device);
            }
        }
    }

    let default = match kind {
        DeviceKind::Input => host.default_input_device(),
        DeviceKind::Output => host.default_output_device(),
    };
    default.ok_or_else(|| EngineError::DeviceNotFound {
        kind: kind.label(),
        query: query.unwrap_or("default").to_string(),
    })
}
