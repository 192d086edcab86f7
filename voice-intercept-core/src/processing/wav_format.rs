//! RIFF/WAVE header helpers for captured voice dumps.

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_SIZE: usize = 44;

/// PCM stream parameters written into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl WavSpec {
    /// 16-bit mono, the shape of every decoded voice batch.
    pub fn voice(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bit_depth: 16,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bit_depth / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Build a header for `data_size` bytes of PCM.
///
/// ```text
/// [0-3]   "RIFF"     [4-7]   36 + data_size
/// [8-11]  "WAVE"     [12-15] "fmt "
/// [16-19] 16         [20-21] 1 (PCM)
/// [22-23] channels   [24-27] sample_rate
/// [28-31] byte_rate  [32-33] block_align
/// [34-35] bit_depth  [36-39] "data"
/// [40-43] data_size
/// ```
pub fn generate_wav_header(spec: WavSpec, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&spec.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&spec.bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Rewrite the RIFF chunk size and data size once the final length is known.
///
/// Sizes beyond `u32::MAX` saturate; WAV cannot describe them.
pub fn patch_sizes(header: &mut [u8], data_size: u64) {
    let data = u32::try_from(data_size).unwrap_or(u32::MAX);
    let chunk = data.saturating_add(36);
    header[4..8].copy_from_slice(&chunk.to_le_bytes());
    header[40..44].copy_from_slice(&data.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(header: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([header[offset], header[offset + 1], header[offset + 2], header[offset + 3]])
    }

    fn u16_at(header: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([header[offset], header[offset + 1]])
    }

    #[test]
    fn header_magic() {
        let header = generate_wav_header(WavSpec::voice(8000), 0);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn voice_header_fields() {
        let header = generate_wav_header(WavSpec::voice(8000), 1600);

        assert_eq!(u16_at(&header, 20), 1);
        assert_eq!(u16_at(&header, 22), 1);
        assert_eq!(u32_at(&header, 24), 8000);
        assert_eq!(u32_at(&header, 28), 16000);
        assert_eq!(u16_at(&header, 32), 2);
        assert_eq!(u16_at(&header, 34), 16);
        assert_eq!(u32_at(&header, 40), 1600);
        assert_eq!(u32_at(&header, 4), 36 + 1600);
    }

    #[test]
    fn patch_updates_both_sizes() {
        let mut header = generate_wav_header(WavSpec::voice(8000), 0);
        patch_sizes(&mut header, 3200);

        assert_eq!(u32_at(&header, 40), 3200);
        assert_eq!(u32_at(&header, 4), 3236);
    }

    #[test]
    fn patch_saturates_oversized_data() {
        let mut header = generate_wav_header(WavSpec::voice(8000), 0);
        patch_sizes(&mut header, u64::MAX);
        assert_eq!(u32_at(&header, 40), u32::MAX);
        assert_eq!(u32_at(&header, 4), u32::MAX);
    }
}
