//! Small shared DSP helpers.

/// Convert a gain in dB to a linear amplitude factor.
pub fn db_to_gain(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

/// Saturating soft clip. Output is strictly inside (-1, 1) for finite input.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Hann window of the given length.
pub fn hann(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / denom;
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * t).cos()
        })
        .collect()
}

/// True if every sample is exactly zero.
pub fn is_silent(samples: &[f32]) -> bool {
    samples.iter().all(|&s| s == 0.0)
}

/// Average interleaved multi-channel audio down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
