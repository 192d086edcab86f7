use super::state::StrategyTag;

/// Decoded mono 16-bit samples from one capture event, tagged with the
/// strategy that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    pub strategy: StrategyTag,
    /// Monotonic across all strategies of one sink.
    pub sequence: u64,
    pub samples: Vec<i16>,
}

impl SampleBatch {
    /// Frames in the batch. Output is mono, so one sample per frame.
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Little-endian PCM bytes of the batch.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}
