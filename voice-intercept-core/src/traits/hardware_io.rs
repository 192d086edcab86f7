use std::sync::Arc;

use serde::Serialize;

use crate::models::error::InterceptError;

/// Run state of a hardware I/O handle as reported by the audio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoState {
    Stopped,
    Running,
    /// Running, but the audio layer permits adding notify callbacks.
    Inspectable,
    Invalid,
}

impl IoState {
    /// Whether a notify callback may be attached without racing the audio thread.
    pub fn permits_tap(self) -> bool {
        matches!(self, Self::Stopped | Self::Inspectable)
    }
}

/// One render cycle as seen by a notify callback.
#[derive(Debug, Clone, Copy)]
pub struct RenderCycle<'a> {
    /// Interleaved 16-bit samples.
    pub samples: &'a [i16],
    pub channels: u16,
    pub post_render: bool,
}

/// Notify callback. Runs on the audio thread: keep it short and lock-light.
pub type RenderNotify = Arc<dyn Fn(&RenderCycle<'_>) + Send + Sync + 'static>;

/// Hardware audio I/O unit owned by the SDK.
pub trait HardwareIo: Send + Sync {
    fn address(&self) -> usize;

    fn state(&self) -> IoState;

    /// Attach a notify callback; returns a token for removal.
    fn add_render_notify(&self, notify: RenderNotify) -> Result<u64, InterceptError>;

    /// Detach synchronously. Unknown tokens are ignored.
    fn remove_render_notify(&self, token: u64);
}
