//! Level metering for 16-bit PCM, normalized to 0.0–1.0.

const FULL_SCALE: f32 = 32768.0;

/// Root-mean-square level.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / FULL_SCALE as f64;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Absolute peak level.
pub fn peak_level(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| s.unsigned_abs())
        .max()
        .map(|p| p as f32 / FULL_SCALE)
        .unwrap_or(0.0)
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[0, 0, 0]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_relative_eq!(rms_level(&[16384, -16384, 16384]), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn peak_handles_minimum_sample() {
        assert_relative_eq!(peak_level(&[0, i16::MIN, 100]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(peak_level(&[8192, -4096]), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn downmix_stereo() {
        assert_eq!(downmix_to_mono(&[100, 300, -50, 50], 2), vec![200, 0]);
        assert_eq!(downmix_to_mono(&[1, 2, 3], 1), vec![1, 2, 3]);
    }

    #[test]
    fn downmix_ignores_trailing_partial_frame() {
        assert_eq!(downmix_to_mono(&[10, 20, 30], 2), vec![15]);
    }
}
