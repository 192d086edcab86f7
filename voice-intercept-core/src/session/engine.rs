use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::diagnostics::report::DiagnosticsReport;
use crate::discovery::discoverer::InstanceDiscoverer;
use crate::intercept::dispatch::DispatchTable;
use crate::intercept::registry::{InterceptHook, InterceptorRegistry};
use crate::models::config::{EngineConfiguration, InterceptMode};
use crate::models::error::InterceptError;
use crate::models::instance::{ConnectionHandle, InstanceSummary};
use crate::models::samples::SampleBatch;
use crate::models::state::{StrategyTag, SupervisorState};
use crate::models::statistics::CaptureStatistics;
use crate::resolver::symbol_resolver::SymbolResolver;
use crate::session::supervisor::FallbackSupervisor;
use crate::sink::capture_sink::CaptureSink;
use crate::strategies::context::StrategyContext;
use crate::strategies::{self, StrategySet};
use crate::traits::capture_delegate::{CaptureDelegate, SampleCallback};
use crate::traits::method_table::{CallFrame, MethodImp, MethodTable};
use crate::traits::object_graph::ObjectGraph;
use crate::traits::symbol_source::SymbolSource;

/// The opaque SDK as seen through the boundary traits.
#[derive(Clone)]
pub struct SdkBindings {
    pub symbols: Arc<dyn SymbolSource>,
    pub objects: Arc<dyn ObjectGraph>,
    /// `None` when the runtime offers no way to replace operations; the
    /// instance-capture intercept is then skipped.
    pub methods: Option<Arc<dyn MethodTable>>,
}

/// Facade over discovery, interception, the four strategies and the sink.
///
/// ```text
/// host ── start / enable_strategy ──▶ [strategies 1-4] ──▶ CaptureSink ──▶ delegate
///              │                              ▲
///              └── FallbackSupervisor ────────┘
/// ```
///
/// Every method takes `&self` and may be called from any thread.
pub struct InterceptEngine {
    config: Arc<EngineConfiguration>,
    session_id: String,
    resolver: Arc<SymbolResolver>,
    discoverer: Arc<InstanceDiscoverer>,
    interceptors: Arc<InterceptorRegistry>,
    sink: Arc<CaptureSink>,
    strategies: Arc<StrategySet>,
    supervisor: FallbackSupervisor,
    connection: Mutex<Option<ConnectionHandle>>,
    disabled: Mutex<[bool; 4]>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    running: AtomicBool,
}

impl InterceptEngine {
    pub fn new(config: EngineConfiguration, sdk: SdkBindings) -> Result<Self, InterceptError> {
        config.validate().map_err(InterceptError::ConfigurationFailed)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        log::debug!("intercept engine {} created", session_id);

        Ok(Self {
            resolver: Arc::new(SymbolResolver::new(sdk.symbols)),
            discoverer: Arc::new(InstanceDiscoverer::new(sdk.objects, config.layout.clone())),
            interceptors: Arc::new(InterceptorRegistry::new(sdk.methods, config.intercept_mode)),
            sink: Arc::new(CaptureSink::new(&config.sink)),
            strategies: Arc::new(StrategySet::new(config.timeouts.stop_timeout())),
            supervisor: FallbackSupervisor::new(),
            connection: Mutex::new(None),
            disabled: Mutex::new([false; 4]),
            started_at: Mutex::new(None),
            running: AtomicBool::new(false),
            session_id,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfiguration {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        self.sink.set_delegate(delegate);
    }

    /// Register a closure as the sample-delivery callback.
    pub fn set_sample_callback<F>(&self, callback: F)
    where
        F: Fn(&SampleBatch) + Send + Sync + 'static,
    {
        self.sink.set_delegate(Arc::new(SampleCallback(callback)));
    }

    pub fn clear_delegate(&self) {
        self.sink.clear_delegate();
    }

    /// Hand over the client connection once the host has a session.
    ///
    /// Used by strategies started afterwards in preference to the client
    /// pointer found on the player.
    pub fn supply_connection(&self, raw: usize) -> Result<(), InterceptError> {
        let handle = ConnectionHandle::new(raw)
            .ok_or_else(|| InterceptError::InstanceNotFound("null connection handle".into()))?;
        *self.connection.lock() = Some(handle);
        log::info!("connection handle {:#x} supplied", raw);
        Ok(())
    }

    /// Start delivery, the instance-capture intercept and, if configured,
    /// the fallback supervisor. Idempotent.
    pub fn start(&self) -> Result<(), InterceptError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.started_at.lock() = Some(Utc::now());

        if let Err(e) = self.sink.start_delivery() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.install_instance_capture();

        if self.config.supervise {
            let order = self.supervised_order();
            self.supervisor.reset();
            if let Err(e) = self
                .supervisor
                .start(Arc::clone(&self.strategies), self.context(), order)
            {
                self.stop();
                return Err(e);
            }
        }
        log::info!("intercept engine {} started", self.session_id);
        Ok(())
    }

    /// Stop everything and restore every intercepted operation. Idempotent.
    ///
    /// Buffers handed to the SDK stay installed.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let timeout = self.config.timeouts.stop_timeout();
        self.supervisor.stop(timeout);
        self.strategies.stop_all();
        self.interceptors.remove_all();
        self.sink.stop_delivery(timeout);
        if was_running {
            log::info!("intercept engine {} stopped", self.session_id);
        }
    }

    /// Start one strategy by hand. Idempotent; also re-enables it for the supervisor.
    pub fn enable_strategy(&self, tag: StrategyTag) -> Result<(), InterceptError> {
        self.disabled.lock()[tag.index()] = false;
        self.sink.start_delivery()?;
        self.strategies.get(tag).start(&self.context())
    }

    /// Stop one strategy and keep the supervisor from choosing it. Idempotent.
    pub fn disable_strategy(&self, tag: StrategyTag) {
        self.disabled.lock()[tag.index()] = true;
        self.strategies.get(tag).stop();
    }

    pub fn is_strategy_active(&self, tag: StrategyTag) -> bool {
        self.strategies.get(tag).is_active()
    }

    pub fn active_strategies(&self) -> Vec<StrategyTag> {
        self.strategies.active()
    }

    /// Block until `tag` captures more frames than it had when called.
    pub fn wait_for_frames(&self, tag: StrategyTag, timeout: Duration) -> Result<u64, InterceptError> {
        let baseline = self.sink.frames_for(tag);
        strategies::await_frames(&self.sink, tag, baseline, timeout, self.config.timeouts.poll_interval())
    }

    pub fn statistics(&self) -> CaptureStatistics {
        self.sink.statistics()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    /// Fresh scan of the player instances currently visible.
    pub fn discover(&self) -> Vec<InstanceSummary> {
        self.discoverer
            .discover_player_instances()
            .map(|instance| instance.summary())
            .collect()
    }

    pub fn diagnostics_report(&self) -> DiagnosticsReport {
        let mut instances = self.discoverer.selected();
        for found in self.discover() {
            if !instances.iter().any(|i| i.kind == found.kind && i.address == found.address) {
                instances.push(found);
            }
        }
        DiagnosticsReport::new(
            self.session_id.clone(),
            *self.started_at.lock(),
            self.is_running(),
            self.supervisor.state(),
            self.config.intercept_mode,
            self.interceptors
                .installed_keys()
                .iter()
                .map(ToString::to_string)
                .collect(),
            &self.resolver.cached(),
            instances,
            &self.sink.statistics(),
            &self.strategies.active(),
        )
    }

    /// Human-readable summary of discovery, installed strategies and counters.
    pub fn diagnostics(&self) -> String {
        self.diagnostics_report().to_string()
    }

    /// Exercise install, forward and remove on a private dispatch table.
    ///
    /// Confirms the interception machinery behaves before it touches the SDK.
    pub fn self_test(&self) -> Result<(), InterceptError> {
        const TYPE: &str = "SelfTest";
        const OP: &str = "echo";

        let table = Arc::new(DispatchTable::new());
        let original: MethodImp = Arc::new(|frame: &CallFrame<'_>| frame.args.first().copied().unwrap_or(0) as isize);
        table.define(TYPE, OP, Arc::clone(&original));
        let registry = InterceptorRegistry::new(Some(table.clone() as Arc<dyn MethodTable>), InterceptMode::Augment);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let hook: InterceptHook = Arc::new(move |frame: &CallFrame<'_>| recorder.lock().push(frame.receiver));
        registry.install_intercept(TYPE, OP, hook)?;

        let frame = CallFrame {
            receiver: 0x5e1f,
            args: &[7],
            payload: None,
        };
        let forwarded = table.invoke(TYPE, OP, &frame);
        registry.remove_intercept(TYPE, OP);
        let restored = table
            .implementation(TYPE, OP)
            .is_some_and(|imp| Arc::ptr_eq(&imp, &original));

        if forwarded != Some(7) || *seen.lock() != [0x5e1f] || !restored {
            return Err(InterceptError::InterceptFailed(format!(
                "self test failed: forwarded={:?} observed={:?} restored={}",
                forwarded,
                seen.lock(),
                restored
            )));
        }
        log::debug!("interception self test passed");
        Ok(())
    }

    fn context(&self) -> StrategyContext {
        StrategyContext {
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
            discoverer: Arc::clone(&self.discoverer),
            interceptors: Arc::clone(&self.interceptors),
            sink: Arc::clone(&self.sink),
            connection: *self.connection.lock(),
        }
    }

    fn supervised_order(&self) -> Vec<StrategyTag> {
        let disabled = *self.disabled.lock();
        self.config
            .strategy_order
            .iter()
            .copied()
            .filter(|tag| !disabled[tag.index()])
            .collect()
    }

    /// Record every receiver of the configured player operation so players
    /// created before a scan is possible are still found.
    fn install_instance_capture(&self) {
        let Some(selector) = self.config.layout.capture_selector.as_deref() else {
            return;
        };
        let discoverer = Arc::clone(&self.discoverer);
        let hook: InterceptHook = Arc::new(move |frame: &CallFrame<'_>| discoverer.note_receiver(frame.receiver));

        // Always forwards, whatever the configured mode.
        match self.interceptors.install_intercept_with_mode(
            &self.config.layout.player_type,
            selector,
            hook,
            InterceptMode::Augment,
        ) {
            Ok(()) => log::info!(
                "capturing {} instances via {}",
                self.config.layout.player_type,
                selector
            ),
            Err(e) => log::warn!("instance capture unavailable: {}", e),
        }
    }
}

impl Drop for InterceptEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
