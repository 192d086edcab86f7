use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::InterceptError;
use crate::models::state::{InterceptionState, StrategyTag};
use crate::processing::levels::downmix_to_mono;
use crate::sink::capture_sink::CaptureSink;
use crate::strategies::attempt;
use crate::strategies::context::StrategyContext;
use crate::traits::capture_strategy::CaptureStrategy;
use crate::traits::hardware_io::{HardwareIo, RenderCycle, RenderNotify};
use crate::worker::Gate;

struct AttachedTap {
    io: Arc<dyn HardwareIo>,
    token: u64,
    gate: Gate,
    sink: Arc<CaptureSink>,
}

/// Strategy 1: a post-render notify on the player's hardware I/O unit.
///
/// Least invasive of the four. The callback runs on the audio thread and
/// only down-mixes and forwards to the sink, through a gate that `stop`
/// closes before it returns.
pub struct RenderNotifyTap {
    attached: Mutex<Option<AttachedTap>>,
}

impl RenderNotifyTap {
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(None),
        }
    }

    fn notify_for(sink: Arc<CaptureSink>, gate: Gate) -> RenderNotify {
        Arc::new(move |cycle: &RenderCycle<'_>| {
            if !cycle.post_render {
                return;
            }
            if cycle.channels > 1 {
                let mono = downmix_to_mono(cycle.samples, usize::from(cycle.channels));
                gate.pass(|| sink.on_frames(StrategyTag::RenderNotify, &mono));
            } else {
                gate.pass(|| sink.on_frames(StrategyTag::RenderNotify, cycle.samples));
            }
        })
    }
}

impl Default for RenderNotifyTap {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureStrategy for RenderNotifyTap {
    fn tag(&self) -> StrategyTag {
        StrategyTag::RenderNotify
    }

    fn start(&self, ctx: &StrategyContext) -> Result<(), InterceptError> {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            return Ok(());
        }

        attempt(ctx, self.tag(), || {
            let unit = ctx.discoverer.select_audio_unit()?;
            ctx.interceptors.confirm_inspectable(unit.io.as_ref())?;
            ctx.sink.set_state(self.tag(), InterceptionState::Installed);

            let gate = Gate::open();
            let token = match unit.io.add_render_notify(Self::notify_for(Arc::clone(&ctx.sink), gate.clone())) {
                Ok(token) => token,
                Err(e) => {
                    gate.close();
                    return Err(InterceptError::InterceptFailed(format!(
                        "render notify on {:#x} rejected: {}",
                        unit.io.address(),
                        e
                    )));
                }
            };

            log::info!("render notify attached to I/O unit {:#x}", unit.io.address());
            *attached = Some(AttachedTap {
                io: unit.io,
                token,
                gate,
                sink: Arc::clone(&ctx.sink),
            });
            ctx.sink.set_state(self.tag(), InterceptionState::Active);
            Ok(())
        })
    }

    fn stop(&self) {
        if let Some(tap) = self.attached.lock().take() {
            tap.gate.close();
            tap.io.remove_render_notify(tap.token);
            log::info!("render notify detached from I/O unit {:#x}", tap.io.address());
            tap.sink.set_state(self.tag(), InterceptionState::Uninstalled);
        }
    }

    fn is_active(&self) -> bool {
        self.attached.lock().as_ref().is_some_and(|tap| tap.gate.is_open())
    }
}
