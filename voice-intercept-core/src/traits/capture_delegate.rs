use crate::models::error::InterceptError;
use crate::models::samples::SampleBatch;
use crate::models::state::{InterceptionState, StrategyTag};

/// Consumer of captured audio and engine events.
///
/// `on_samples` is called from the sink's delivery thread, never from an
/// SDK thread. State and error notifications arrive on whichever thread
/// caused them.
pub trait CaptureDelegate: Send + Sync {
    fn on_samples(&self, batch: &SampleBatch);

    fn on_state_changed(&self, _strategy: StrategyTag, _state: InterceptionState) {}

    fn on_error(&self, _strategy: StrategyTag, _error: &InterceptError) {}
}

/// Adapter turning a closure into a [`CaptureDelegate`].
pub struct SampleCallback<F>(pub F);

impl<F> CaptureDelegate for SampleCallback<F>
where
    F: Fn(&SampleBatch) + Send + Sync,
{
    fn on_samples(&self, batch: &SampleBatch) {
        (self.0)(batch)
    }
}
