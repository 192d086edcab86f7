use serde::Serialize;

use super::error::InterceptError;
use super::state::{InterceptionState, StrategyTag};

/// Per-strategy counters and state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStatistics {
    pub strategy: StrategyTag,
    pub state: InterceptionState,
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub batches: u64,
    pub anomalies: u64,
    /// RMS of the most recent batch, 0.0–1.0.
    pub last_level: f32,
    /// Peak of the most recent batch, 0.0–1.0.
    pub last_peak: f32,
    /// First precondition that failed on the most recent start attempt.
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<InterceptError>,
}

/// Snapshot of capture counters.
///
/// Counters only grow. A snapshot may lag concurrent capture slightly but
/// never reports a value lower than an earlier snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureStatistics {
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub dropped_batches: u64,
    pub per_strategy: Vec<StrategyStatistics>,
}

impl CaptureStatistics {
    pub fn strategy(&self, tag: StrategyTag) -> Option<&StrategyStatistics> {
        self.per_strategy.iter().find(|s| s.strategy == tag)
    }

    pub fn frames_for(&self, tag: StrategyTag) -> u64 {
        self.strategy(tag).map(|s| s.frames_captured).unwrap_or(0)
    }

    pub fn state_of(&self, tag: StrategyTag) -> InterceptionState {
        self.strategy(tag).map(|s| s.state).unwrap_or_default()
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<InterceptError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
