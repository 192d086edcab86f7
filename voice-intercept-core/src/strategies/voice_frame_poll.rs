use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::alaw;
use crate::models::error::InterceptError;
use crate::models::instance::Capabilities;
use crate::models::state::{InterceptionState, StrategyTag};
use crate::sink::capture_sink::CaptureSink;
use crate::strategies::attempt;
use crate::strategies::context::StrategyContext;
use crate::traits::capture_strategy::CaptureStrategy;
use crate::worker::PollWorker;

/// Strategy 2: poll the player's most recent A-law voice frame.
///
/// The field is overwritten in place by the SDK, so consecutive identical
/// reads are treated as the same frame and decoded once.
pub struct VoiceFramePoller {
    worker: PollWorker,
    sink: Mutex<Option<Arc<CaptureSink>>>,
    stop_timeout: Duration,
}

impl VoiceFramePoller {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            worker: PollWorker::new("voice-frame-poll"),
            sink: Mutex::new(None),
            stop_timeout,
        }
    }
}

impl CaptureStrategy for VoiceFramePoller {
    fn tag(&self) -> StrategyTag {
        StrategyTag::VoiceFramePoll
    }

    fn start(&self, ctx: &StrategyContext) -> Result<(), InterceptError> {
        let mut slot = self.sink.lock();
        if self.worker.is_running() {
            return Ok(());
        }

        attempt(ctx, self.tag(), || {
            let player = ctx.discoverer.select_player(Capabilities::VOICE_FRAME)?;
            ctx.sink.set_state(self.tag(), InterceptionState::Installed);

            let tag = self.tag();
            let handle = Arc::clone(&player.handle);
            let field = ctx.discoverer.layout().voice_frame_field.clone();
            let max_frame_bytes = ctx.config.max_frame_bytes;
            let sink = Arc::clone(&ctx.sink);
            let mut last: Option<Vec<u8>> = None;

            self.worker.spawn(ctx.config.timeouts.poll_interval(), move |gate| {
                if !handle.is_alive() {
                    sink.record_failure(
                        tag,
                        &InterceptError::InstanceNotFound(format!(
                            "player at {:#x} went away",
                            handle.address()
                        )),
                    );
                    return false;
                }

                match handle.read_bytes(&field) {
                    Ok(Some(frame)) if frame.len() > max_frame_bytes => {
                        sink.note_anomaly(
                            tag,
                            &InterceptError::DecodeAnomaly(format!(
                                "{} byte frame exceeds {}",
                                frame.len(),
                                max_frame_bytes
                            )),
                        );
                    }
                    Ok(Some(frame)) => {
                        if frame.is_empty() || last.as_deref() == Some(frame.as_slice()) {
                            return true;
                        }
                        let samples = alaw::decode_frame(&frame);
                        if gate.pass(|| sink.on_frames(tag, &samples)).is_none() {
                            return false;
                        }
                        last = Some(frame);
                    }
                    Ok(None) => {}
                    Err(e) => sink.note_anomaly(tag, &e),
                }
                true
            })?;

            log::info!(
                "polling {} on player {:#x}",
                ctx.discoverer.layout().voice_frame_field,
                player.address
            );
            *slot = Some(Arc::clone(&ctx.sink));
            ctx.sink.set_state(self.tag(), InterceptionState::Active);
            Ok(())
        })
    }

    fn stop(&self) {
        self.worker.stop(self.stop_timeout);
        if let Some(sink) = self.sink.lock().take() {
            if sink.state(self.tag()) == InterceptionState::Active {
                sink.set_state(self.tag(), InterceptionState::Uninstalled);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::Harness;
    use crate::testing::{wait_until, MockField, MockHandle};

    const WAIT: Duration = Duration::from_secs(2);

    fn start_with_frame(bytes: &[u8]) -> (Harness, Arc<MockHandle>, VoiceFramePoller) {
        let harness = Harness::new();
        let player = MockHandle::new(0x2000);
        player.set_bytes("voice_frame", bytes);
        harness.objects.add("AppIOSPlayer", player.clone());
        let poller = VoiceFramePoller::new(Duration::from_millis(500));
        poller.start(&harness.ctx).unwrap();
        (harness, player, poller)
    }

    #[test]
    fn decodes_each_distinct_frame_once() {
        let (harness, _player, poller) = start_with_frame(&[0x55, 0xD5, 0x7F]);
        let sink = &harness.ctx.sink;

        assert!(wait_until(WAIT, || sink.frames_for(StrategyTag::VoiceFramePoll) >= 3));
        std::thread::sleep(Duration::from_millis(20));
        poller.stop();
        sink.deliver_pending();

        assert_eq!(harness.delegate.samples_for(StrategyTag::VoiceFramePoll), vec![-8, 8, -848]);
        assert_eq!(sink.frames_for(StrategyTag::VoiceFramePoll), 3);
    }

    #[test]
    fn new_frame_contents_are_picked_up() {
        let (harness, player, poller) = start_with_frame(&[0x55]);
        let sink = &harness.ctx.sink;
        assert!(wait_until(WAIT, || sink.frames_for(StrategyTag::VoiceFramePoll) == 1));

        player.set_bytes("voice_frame", &[0xD5, 0xD5]);
        assert!(wait_until(WAIT, || sink.frames_for(StrategyTag::VoiceFramePoll) == 3));
        poller.stop();
        sink.deliver_pending();

        assert_eq!(harness.delegate.samples_for(StrategyTag::VoiceFramePoll), vec![-8, 8, 8]);
    }

    #[test]
    fn read_outliving_stop_delivers_nothing() {
        let harness = Harness::new();
        let player = MockHandle::new(0x2000);
        player.set_bytes("voice_frame", &[0x55, 0xD5]);
        player.set_read_delay(Duration::from_millis(150));
        harness.objects.add("AppIOSPlayer", player);

        let poller = VoiceFramePoller::new(Duration::from_millis(20));
        poller.start(&harness.ctx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        poller.stop();
        assert!(!poller.is_active());

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(harness.ctx.sink.frames_for(StrategyTag::VoiceFramePoll), 0);
    }

    #[test]
    fn oversized_and_unreadable_frames_are_anomalies() {
        let mut config = crate::models::config::EngineConfiguration::default();
        config.max_frame_bytes = 2;
        let harness = Harness::with(config, crate::testing::MockSymbols::new());
        let player = MockHandle::new(0x2000);
        player.set_bytes("voice_frame", &[1, 2, 3]);
        harness.objects.add("AppIOSPlayer", player.clone());

        let poller = VoiceFramePoller::new(Duration::from_millis(500));
        poller.start(&harness.ctx).unwrap();
        let anomalies = || {
            harness
                .ctx
                .sink
                .statistics()
                .strategy(StrategyTag::VoiceFramePoll)
                .map(|s| s.anomalies)
                .unwrap_or(0)
        };
        assert!(wait_until(WAIT, || anomalies() >= 1));

        player.set_field("voice_frame", MockField::Corrupt);
        let before = anomalies();
        assert!(wait_until(WAIT, || anomalies() > before));
        poller.stop();

        assert_eq!(harness.ctx.sink.frames_for(StrategyTag::VoiceFramePoll), 0);
        assert!(!poller.is_active());
    }

    #[test]
    fn vanished_player_fails_the_strategy() {
        let (harness, player, poller) = start_with_frame(&[0x55]);
        player.set_alive(false);

        assert!(wait_until(WAIT, || !poller.is_active()));
        assert_eq!(harness.ctx.sink.state(StrategyTag::VoiceFramePoll), InterceptionState::Failed);
        assert!(matches!(
            harness.ctx.sink.last_error(StrategyTag::VoiceFramePoll),
            Some(InterceptError::InstanceNotFound(_))
        ));
        poller.stop();
        assert_eq!(harness.ctx.sink.state(StrategyTag::VoiceFramePoll), InterceptionState::Failed);
    }

    #[test]
    fn player_without_frame_field_is_instance_not_found() {
        let harness = Harness::new();
        harness.objects.add("AppIOSPlayer", MockHandle::new(0x2000));

        let poller = VoiceFramePoller::new(Duration::from_millis(500));
        let err = poller.start(&harness.ctx).unwrap_err();

        assert!(matches!(err, InterceptError::InstanceNotFound(_)));
        assert!(!poller.is_active());
    }
}
