//! Polyphase resampling helper.
//!
//! Thin wrapper over rubato's sinc resampler used by the pitch and formant
//! shifters. Both of those are stateless per call, so the resampler is built
//! for the exact chunk at hand, flushed, and discarded. The sinc filter's
//! group delay is trimmed from the head so the output stays time-aligned
//! with the input and the chunk tail is fully rendered.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::DspError;

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resample `input` to exactly `target_len` samples.
///
/// The resampler buffers its filter history internally, so after the main
/// pass the remaining tail is flushed with zero-padded partial calls and the
/// leading group delay is dropped before the final truncate/zero-pad.
pub fn resample_to(input: &[f32], target_len: usize) -> Result<Vec<f32>, DspError> {
    if input.is_empty() || target_len == 0 {
        return Ok(vec![0.0; target_len]);
    }

    let ratio = target_len as f64 / input.len() as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_params(), input.len(), 1)?;
    let delay = resampler.output_delay();

    let mut channels = resampler.process(&[input], None)?;
    let mut out = channels.pop().unwrap_or_default();
    while out.len() < target_len + delay {
        let mut more = resampler.process_partial::<&[f32]>(None, None)?;
        let extra = more.pop().unwrap_or_default();
        if extra.is_empty() {
            break;
        }
        out.extend_from_slice(&extra);
    }

    out.drain(..delay.min(out.len()));
    out.resize(target_len, 0.0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_output_length() {
        let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.05).sin()).collect();
        for &target in &[512usize, 768, 1024, 1500, 2048] {
            let out = resample_to(&input, target).unwrap();
            assert_eq!(out.len(), target);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(resample_to(&[], 64).unwrap(), vec![0.0; 64]);
        assert!(resample_to(&[1.0; 32], 0).unwrap().is_empty());
    }

    #[test]
    fn test_interior_preserves_constant_signal() {
        let input = vec![1.0; 1024];
        let out = resample_to(&input, 512).unwrap();
        // Away from the filter edges a constant stays at full scale.
        for &s in &out[32..480] {
            assert!((s - 1.0).abs() < 0.05, "interior sample {s}");
        }
    }

    #[test]
    fn test_double_resample_renders_tail() {
        // Down and back up, the path the pitch/formant shifters take. The
        // tail must carry real signal, not silence left by an unflushed
        // filter.
        let input = vec![1.0; 1024];
        let down = resample_to(&input, 512).unwrap();
        let back = resample_to(&down, 1024).unwrap();
        assert_eq!(back.len(), 1024);

        for &s in &back[64..960] {
            assert!((s - 1.0).abs() < 0.05, "interior sample {s}");
        }
        // The last samples taper with the filter edge but never drop out.
        for (i, &s) in back[960..].iter().enumerate() {
            assert!(s > 0.1, "tail sample {} = {s}", 960 + i);
        }
    }
}
