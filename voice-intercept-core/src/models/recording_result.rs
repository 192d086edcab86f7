use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::state::StrategyTag;

/// Result returned when a capture recording is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Frames one strategy contributed to a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFrames {
    pub strategy: StrategyTag,
    pub frames: u64,
}

/// Sidecar metadata written next to a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    /// Engine session that produced the audio, when known.
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: String,
    pub file_path: String,
    pub checksum: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub duration_secs: f64,
    pub frames: u64,
    /// Per-strategy contribution, in priority order.
    pub strategies: Vec<StrategyFrames>,
    /// Strategy that contributed the most frames.
    pub primary_strategy: Option<StrategyTag>,
    /// Diagnostics text captured alongside the audio.
    #[serde(default)]
    pub diagnostics: Option<String>,
}

impl RecordingMetadata {
    /// Metadata for a 16-bit mono voice recording.
    pub fn new_voice(file_path: &str, checksum: &str, sample_rate: u32, strategies: Vec<StrategyFrames>) -> Self {
        let frames = strategies.iter().map(|s| s.frames).sum();
        let primary_strategy = strategies
            .iter()
            .filter(|s| s.frames > 0)
            .max_by(|a, b| a.frames.cmp(&b.frames).then(b.strategy.cmp(&a.strategy)))
            .map(|s| s.strategy);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            sample_rate,
            channels: 1,
            bit_depth: 16,
            duration_secs: frames as f64 / f64::from(sample_rate.max(1)),
            frames,
            strategies,
            primary_strategy,
            diagnostics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_strategy_is_the_largest_contributor() {
        let metadata = RecordingMetadata::new_voice(
            "/tmp/voice.wav",
            "00",
            8000,
            vec![
                StrategyFrames { strategy: StrategyTag::RenderNotify, frames: 0 },
                StrategyFrames { strategy: StrategyTag::VoiceFramePoll, frames: 8000 },
                StrategyFrames { strategy: StrategyTag::ChannelBuffer, frames: 4000 },
            ],
        );
        assert_eq!(metadata.frames, 12000);
        assert_eq!(metadata.primary_strategy, Some(StrategyTag::VoiceFramePoll));
        assert!((metadata.duration_secs - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_recording_has_no_primary_strategy() {
        let metadata = RecordingMetadata::new_voice("/tmp/empty.wav", "00", 8000, Vec::new());
        assert_eq!(metadata.primary_strategy, None);
        assert_eq!(metadata.frames, 0);
    }
}
