use crate::models::error::InterceptError;
use crate::models::state::StrategyTag;
use crate::strategies::context::StrategyContext;

/// One self-contained pipeline that tries to obtain audio from the SDK.
///
/// `start` and `stop` are idempotent and callable from any thread. After
/// `stop` returns the strategy delivers no further frames.
pub trait CaptureStrategy: Send + Sync {
    fn tag(&self) -> StrategyTag;

    fn start(&self, ctx: &StrategyContext) -> Result<(), InterceptError>;

    fn stop(&self);

    fn is_active(&self) -> bool;
}
