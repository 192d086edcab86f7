//! The four capture strategies, ordered by increasing invasiveness.

pub mod channel_buffer;
pub mod context;
pub mod render_notify;
pub mod vendor_listener;
pub mod voice_frame_poll;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::error::InterceptError;
use crate::models::state::StrategyTag;
use crate::sink::capture_sink::CaptureSink;
use crate::traits::capture_strategy::CaptureStrategy;

use self::channel_buffer::ChannelBufferCapture;
use self::context::StrategyContext;
use self::render_notify::RenderNotifyTap;
use self::vendor_listener::VendorListenerCapture;
use self::voice_frame_poll::VoiceFramePoller;

/// One instance of each strategy, indexed by tag.
pub struct StrategySet {
    strategies: [Arc<dyn CaptureStrategy>; 4],
}

impl StrategySet {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            strategies: [
                Arc::new(RenderNotifyTap::new()),
                Arc::new(VoiceFramePoller::new(stop_timeout)),
                Arc::new(VendorListenerCapture::new()),
                Arc::new(ChannelBufferCapture::new(stop_timeout)),
            ],
        }
    }

    pub fn get(&self, tag: StrategyTag) -> Arc<dyn CaptureStrategy> {
        Arc::clone(&self.strategies[tag.index()])
    }

    pub fn active(&self) -> Vec<StrategyTag> {
        self.strategies
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.tag())
            .collect()
    }

    pub fn stop_all(&self) {
        for strategy in &self.strategies {
            strategy.stop();
        }
    }
}

/// Run a start attempt, recording any failure against `tag`.
pub(crate) fn attempt<F>(ctx: &StrategyContext, tag: StrategyTag, start: F) -> Result<(), InterceptError>
where
    F: FnOnce() -> Result<(), InterceptError>,
{
    ctx.sink.begin_attempt(tag);
    start().map_err(|e| {
        ctx.sink.record_failure(tag, &e);
        e
    })
}

/// Wait until `tag` has captured more than `baseline` frames.
///
/// Returns the new frame count, or `Timeout` once `timeout` elapses.
pub fn await_frames(
    sink: &CaptureSink,
    tag: StrategyTag,
    baseline: u64,
    timeout: Duration,
    poll: Duration,
) -> Result<u64, InterceptError> {
    let deadline = Instant::now() + timeout;
    loop {
        let frames = sink.frames_for(tag);
        if frames > baseline {
            return Ok(frames);
        }
        if Instant::now() >= deadline {
            return Err(InterceptError::Timeout(format!(
                "{} delivered no frames within {:?}",
                tag.name(),
                timeout
            )));
        }
        thread::sleep(poll);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::context::StrategyContext;
    use crate::discovery::discoverer::InstanceDiscoverer;
    use crate::intercept::registry::InterceptorRegistry;
    use crate::models::config::EngineConfiguration;
    use crate::resolver::symbol_resolver::SymbolResolver;
    use crate::sink::capture_sink::CaptureSink;
    use crate::testing::{CollectingDelegate, MockObjectGraph, MockSymbols};

    pub struct Harness {
        pub objects: Arc<MockObjectGraph>,
        pub delegate: Arc<CollectingDelegate>,
        pub ctx: StrategyContext,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with(EngineConfiguration::default(), MockSymbols::new())
        }

        pub fn with_symbols(symbols: MockSymbols) -> Self {
            Self::with(EngineConfiguration::default(), symbols)
        }

        pub fn with(mut config: EngineConfiguration, symbols: MockSymbols) -> Self {
            config.timeouts.poll_interval_ms = 2;
            let objects = MockObjectGraph::new();
            let delegate = CollectingDelegate::new();
            let sink = Arc::new(CaptureSink::new(&config.sink));
            sink.set_delegate(delegate.clone());
            let ctx = StrategyContext {
                resolver: Arc::new(SymbolResolver::new(Arc::new(symbols))),
                discoverer: Arc::new(InstanceDiscoverer::new(objects.clone(), config.layout.clone())),
                interceptors: Arc::new(InterceptorRegistry::new(None, config.intercept_mode)),
                sink,
                connection: None,
                config: Arc::new(config),
            };
            Self { objects, delegate, ctx }
        }
    }
}
