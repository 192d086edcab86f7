use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::SinkConfiguration;
use crate::models::error::InterceptError;
use crate::models::samples::SampleBatch;
use crate::models::state::{InterceptionState, StrategyTag};
use crate::models::statistics::{CaptureStatistics, StrategyStatistics};
use crate::processing::levels;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::worker::PollWorker;

#[derive(Default)]
struct StrategyCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
    batches: AtomicU64,
    anomalies: AtomicU64,
    level_bits: AtomicU32,
    peak_bits: AtomicU32,
}

#[derive(Debug, Clone, Default)]
struct StrategyStatus {
    state: InterceptionState,
    last_error: Option<InterceptError>,
}

/// Collects decoded samples from every strategy and hands them to the
/// registered consumer.
///
/// ```text
/// [strategy threads / SDK callbacks] → on_frames → [bounded queue] → delivery thread → delegate
/// ```
///
/// `on_frames` may run on an SDK audio thread. It touches only atomics and
/// one short queue lock; the consumer is never called from it. When the
/// consumer falls behind, the oldest queued batch is dropped.
pub struct CaptureSink {
    queue: Mutex<RingBuffer<SampleBatch>>,
    counters: [StrategyCounters; 4],
    status: Mutex<[StrategyStatus; 4]>,
    frames_total: AtomicU64,
    bytes_total: AtomicU64,
    dropped: AtomicU64,
    sequence: AtomicU64,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    delivery: PollWorker,
    delivery_interval: Duration,
}

impl CaptureSink {
    pub fn new(config: &SinkConfiguration) -> Self {
        Self {
            queue: Mutex::new(RingBuffer::new(config.queue_capacity)),
            counters: Default::default(),
            status: Mutex::new(Default::default()),
            frames_total: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            delegate: Mutex::new(None),
            delivery: PollWorker::new("voice-sink-delivery"),
            delivery_interval: Duration::from_millis(config.delivery_interval_ms.max(1)),
        }
    }

    /// Register the single consumer, replacing any previous one.
    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        *self.delegate.lock() = None;
    }

    /// Append decoded samples produced by `strategy`.
    pub fn on_frames(&self, strategy: StrategyTag, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let frames = samples.len() as u64;
        let bytes = frames * 2;
        let counters = &self.counters[strategy.index()];
        counters.frames.fetch_add(frames, Ordering::Relaxed);
        counters.bytes.fetch_add(bytes, Ordering::Relaxed);
        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters
            .level_bits
            .store(levels::rms_level(samples).to_bits(), Ordering::Relaxed);
        counters
            .peak_bits
            .store(levels::peak_level(samples).to_bits(), Ordering::Relaxed);
        self.frames_total.fetch_add(frames, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes, Ordering::Relaxed);

        let batch = SampleBatch {
            strategy,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            samples: samples.to_vec(),
        };
        if self.queue.lock().push(batch).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a frame that was skipped because it could not be decoded.
    pub fn note_anomaly(&self, strategy: StrategyTag, error: &InterceptError) {
        let count = self.counters[strategy.index()]
            .anomalies
            .fetch_add(1, Ordering::Relaxed);
        if count == 0 {
            log::debug!("{}: skipping anomalous frame: {}", strategy.name(), error);
        }
    }

    /// Pull up to `max` queued batches without involving the delegate.
    pub fn drain(&self, max: usize) -> Vec<SampleBatch> {
        self.queue.lock().drain(max)
    }

    /// Hand every queued batch to the delegate. Returns the number delivered.
    ///
    /// With no delegate registered, batches stay queued.
    pub fn deliver_pending(&self) -> usize {
        let Some(delegate) = self.delegate.lock().clone() else {
            return 0;
        };
        let batches = {
            let mut queue = self.queue.lock();
            let count = queue.count();
            queue.drain(count)
        };
        for batch in &batches {
            delegate.on_samples(batch);
        }
        batches.len()
    }

    /// Start the background delivery loop. Idempotent.
    pub fn start_delivery(self: &Arc<Self>) -> Result<(), InterceptError> {
        let sink = Arc::clone(self);
        self.delivery.spawn(self.delivery_interval, move |_| {
            sink.deliver_pending();
            true
        })
    }

    /// Stop the delivery loop and flush what is queued.
    pub fn stop_delivery(&self, timeout: Duration) {
        self.delivery.stop(timeout);
        self.deliver_pending();
    }

    /// Mark the start of a new attempt: clears the previous failure.
    pub fn begin_attempt(&self, strategy: StrategyTag) {
        self.status.lock()[strategy.index()].last_error = None;
    }

    pub fn set_state(&self, strategy: StrategyTag, state: InterceptionState) {
        let changed = {
            let mut status = self.status.lock();
            let entry = &mut status[strategy.index()];
            let changed = entry.state != state;
            entry.state = state;
            changed
        };
        if changed {
            log::info!("{} -> {:?}", strategy.name(), state);
            let delegate = self.delegate.lock().clone();
            if let Some(delegate) = delegate {
                delegate.on_state_changed(strategy, state);
            }
        }
    }

    /// Record why a strategy could not run.
    ///
    /// Missing symbols leave it `Uninstalled`; anything else marks it `Failed`.
    pub fn record_failure(&self, strategy: StrategyTag, error: &InterceptError) {
        let state = match error {
            InterceptError::SymbolNotFound(_) => InterceptionState::Uninstalled,
            _ => InterceptionState::Failed,
        };
        log::warn!("{} unavailable: {}", strategy.name(), error);
        self.status.lock()[strategy.index()].last_error = Some(error.clone());
        self.set_state(strategy, state);
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = delegate {
            delegate.on_error(strategy, error);
        }
    }

    pub fn state(&self, strategy: StrategyTag) -> InterceptionState {
        self.status.lock()[strategy.index()].state
    }

    pub fn last_error(&self, strategy: StrategyTag) -> Option<InterceptError> {
        self.status.lock()[strategy.index()].last_error.clone()
    }

    pub fn frames_for(&self, strategy: StrategyTag) -> u64 {
        self.counters[strategy.index()].frames.load(Ordering::Relaxed)
    }

    pub fn statistics(&self) -> CaptureStatistics {
        let status = self.status.lock().clone();
        let per_strategy = StrategyTag::ALL
            .iter()
            .map(|&tag| {
                let c = &self.counters[tag.index()];
                let s = &status[tag.index()];
                StrategyStatistics {
                    strategy: tag,
                    state: s.state,
                    frames_captured: c.frames.load(Ordering::Relaxed),
                    bytes_captured: c.bytes.load(Ordering::Relaxed),
                    batches: c.batches.load(Ordering::Relaxed),
                    anomalies: c.anomalies.load(Ordering::Relaxed),
                    last_level: f32::from_bits(c.level_bits.load(Ordering::Relaxed)),
                    last_peak: f32::from_bits(c.peak_bits.load(Ordering::Relaxed)),
                    last_error: s.last_error.clone(),
                }
            })
            .collect();

        CaptureStatistics {
            frames_captured: self.frames_total.load(Ordering::Relaxed),
            bytes_captured: self.bytes_total.load(Ordering::Relaxed),
            dropped_batches: self.dropped.load(Ordering::Relaxed),
            per_strategy,
        }
    }
}
