use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::InterceptError;
use crate::models::state::{StrategyTag, SupervisorState};
use crate::strategies::context::StrategyContext;
use crate::strategies::StrategySet;
use crate::worker::PollWorker;

struct Attempt {
    tag: StrategyTag,
    baseline: u64,
    deadline: Instant,
}

/// Where the escalation currently stands.
struct Escalation {
    order: Vec<StrategyTag>,
    next: usize,
    current: Option<Attempt>,
}

/// Automatic timeout-driven escalation through the strategy chain.
///
/// Strategies are started one at a time in the configured order. A start
/// error moves on at once; a started strategy that delivers no new frames
/// before its first-frame timeout is stopped, marked failed with
/// `Timeout`, and the next one is tried. The first strategy to deliver is
/// left running and the supervisor locks onto it.
///
/// ```text
/// Idle → Trying(1) → Trying(2) → … → Locked(n)
///                                  ↘ Exhausted
/// ```
pub struct FallbackSupervisor {
    worker: PollWorker,
    state: Arc<Mutex<SupervisorState>>,
}

impl FallbackSupervisor {
    pub fn new() -> Self {
        Self {
            worker: PollWorker::new("fallback-supervisor"),
            state: Arc::new(Mutex::new(SupervisorState::Idle)),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Begin escalating through `order`. No-op while a run is in progress.
    pub fn start(
        &self,
        strategies: Arc<StrategySet>,
        ctx: StrategyContext,
        order: Vec<StrategyTag>,
    ) -> Result<(), InterceptError> {
        if self.worker.is_running() {
            return Ok(());
        }
        log::info!(
            "supervising strategies in order {:?}",
            order.iter().map(|t| t.id()).collect::<Vec<_>>()
        );
        *self.state.lock() = SupervisorState::Idle;

        let state = Arc::clone(&self.state);
        let mut escalation = Escalation {
            order,
            next: 0,
            current: None,
        };
        self.worker.spawn(ctx.config.timeouts.poll_interval(), move |_| {
            let next = escalation.step(&strategies, &ctx);
            *state.lock() = next;
            !next.is_terminal()
        })
    }

    /// Stop escalating. Strategies already running are left to the caller.
    pub fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout);
        let mut state = self.state.lock();
        if matches!(*state, SupervisorState::Trying(_)) {
            *state = SupervisorState::Stopped;
        }
    }

    /// Forget a finished run so the next start begins from `Idle`.
    pub fn reset(&self) {
        if !self.worker.is_running() {
            *self.state.lock() = SupervisorState::Idle;
        }
    }
}

impl Default for FallbackSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Escalation {
    /// Advance by at most one transition.
    fn step(&mut self, strategies: &StrategySet, ctx: &StrategyContext) -> SupervisorState {
        let Some(attempt) = self.current.as_ref() else {
            return self.start_next(strategies, ctx);
        };

        let tag = attempt.tag;
        if ctx.sink.frames_for(tag) > attempt.baseline {
            log::info!("{} delivered frames; locking", tag.name());
            return SupervisorState::Locked(tag);
        }

        let strategy = strategies.get(tag);
        if !strategy.is_active() {
            // Failed on its own, e.g. the instance it polled went away.
            log::info!("{} stopped before delivering; escalating", tag.name());
            self.current = None;
            return SupervisorState::Trying(tag);
        }

        if Instant::now() >= attempt.deadline {
            let timeout = ctx.config.timeouts.first_frame_timeout(tag);
            strategy.stop();
            ctx.sink.record_failure(
                tag,
                &InterceptError::Timeout(format!("no frames within {:?}", timeout)),
            );
            self.current = None;
        }
        SupervisorState::Trying(tag)
    }

    fn start_next(&mut self, strategies: &StrategySet, ctx: &StrategyContext) -> SupervisorState {
        let Some(&tag) = self.order.get(self.next) else {
            log::warn!("every strategy failed; no capture possible");
            return SupervisorState::Exhausted;
        };
        self.next += 1;

        let strategy = strategies.get(tag);
        let baseline = ctx.sink.frames_for(tag);
        match strategy.start(ctx) {
            Ok(()) => {
                log::info!("trying {}", tag.name());
                self.current = Some(Attempt {
                    tag,
                    baseline,
                    deadline: Instant::now() + ctx.config.timeouts.first_frame_timeout(tag),
                });
            }
            Err(e) => log::info!("{} did not start ({}); escalating", tag.name(), e.stage()),
        }
        SupervisorState::Trying(tag)
    }
}
