use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::alaw;
use crate::models::config::ListenerPayload;
use crate::models::error::InterceptError;
use crate::models::state::{InterceptionState, StrategyTag};
use crate::sink::capture_sink::CaptureSink;
use crate::strategies::attempt;
use crate::strategies::context::StrategyContext;
use crate::traits::capture_strategy::CaptureStrategy;

/// `int init(void)`
pub type VendorInitFn = unsafe extern "C" fn() -> c_int;
/// `void listener(void *user_data, const uint8_t *data, int len)`
pub type VendorListenerFn = unsafe extern "C" fn(*mut c_void, *const u8, c_int);
/// `int set_listener(listener_fn listener, void *user_data)`
pub type VendorSetListenerFn = unsafe extern "C" fn(Option<VendorListenerFn>, *mut c_void) -> c_int;

struct ListenerRoute {
    generation: usize,
    sink: Arc<CaptureSink>,
    payload: ListenerPayload,
    max_frame_bytes: usize,
}

// The vendor callback carries no context beyond `user_data`, so frames are
// routed through a single process-wide slot. `user_data` holds the
// generation that registered it; stale generations are ignored.
static ROUTE: Mutex<Option<ListenerRoute>> = parking_lot::const_mutex(None);
static GENERATION: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn listener_entry(user_data: *mut c_void, data: *const u8, len: c_int) {
    if data.is_null() || len <= 0 {
        return;
    }
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the SDK guarantees `len` readable bytes at `data` for the
        // duration of the call.
        let bytes = unsafe { std::slice::from_raw_parts(data, len as usize) };
        route_frame(user_data as usize, bytes);
    }));
}

fn route_frame(generation: usize, bytes: &[u8]) {
    // Held through delivery so `clear_route` cannot return mid-frame.
    let route = ROUTE.lock();
    let Some(route) = route.as_ref().filter(|r| r.generation == generation) else {
        return;
    };
    let (sink, tag) = (&route.sink, StrategyTag::VendorListener);

    if bytes.len() > route.max_frame_bytes {
        sink.note_anomaly(
            tag,
            &InterceptError::DecodeAnomaly(format!(
                "{} byte payload exceeds {}",
                bytes.len(),
                route.max_frame_bytes
            )),
        );
        return;
    }

    let samples = match route.payload {
        ListenerPayload::Alaw => alaw::decode_frame(bytes),
        ListenerPayload::Pcm16Le => {
            if bytes.len() % 2 != 0 {
                sink.note_anomaly(
                    tag,
                    &InterceptError::DecodeAnomaly(format!("odd PCM payload length {}", bytes.len())),
                );
            }
            bytes
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect()
        }
    };
    sink.on_frames(tag, &samples);
}

/// Strategy 3: register a listener through the vendor pipeline's own
/// exported setup calls.
///
/// Requires both entry points to resolve; with either missing nothing is
/// called and the strategy stays uninstalled.
pub struct VendorListenerCapture {
    active: AtomicBool,
    generation: Mutex<Option<(usize, Arc<CaptureSink>)>>,
}

impl VendorListenerCapture {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            generation: Mutex::new(None),
        }
    }
}

impl Default for VendorListenerCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureStrategy for VendorListenerCapture {
    fn tag(&self) -> StrategyTag {
        StrategyTag::VendorListener
    }

    fn start(&self, ctx: &StrategyContext) -> Result<(), InterceptError> {
        let mut registered = self.generation.lock();
        if registered.is_some() {
            return Ok(());
        }

        attempt(ctx, self.tag(), || {
            let names = &ctx.config.symbols;
            let symbols = ctx
                .resolver
                .resolve_all(&[names.vendor_init.as_str(), names.vendor_set_listener.as_str()])?;
            let (init_sym, set_sym) = (&symbols[0], &symbols[1]);
            ctx.sink.set_state(self.tag(), InterceptionState::Installed);

            // SAFETY: resolved, non-null exports with the documented C signatures.
            let init: VendorInitFn = unsafe { std::mem::transmute::<usize, VendorInitFn>(init_sym.address) };
            let set_listener: VendorSetListenerFn =
                unsafe { std::mem::transmute::<usize, VendorSetListenerFn>(set_sym.address) };

            let rc = unsafe { init() };
            if rc < 0 {
                return Err(InterceptError::InterceptFailed(format!("{} returned {}", init_sym.name, rc)));
            }

            let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
            *ROUTE.lock() = Some(ListenerRoute {
                generation,
                sink: Arc::clone(&ctx.sink),
                payload: ctx.config.listener_payload,
                max_frame_bytes: ctx.config.max_frame_bytes,
            });

            let rc = unsafe { set_listener(Some(listener_entry), generation as *mut c_void) };
            if rc < 0 {
                clear_route(generation);
                return Err(InterceptError::InterceptFailed(format!("{} returned {}", set_sym.name, rc)));
            }

            log::info!("vendor listener registered (generation {})", generation);
            self.active.store(true, Ordering::SeqCst);
            *registered = Some((generation, Arc::clone(&ctx.sink)));
            ctx.sink.set_state(self.tag(), InterceptionState::Active);
            Ok(())
        })
    }

    /// Stops routing frames. The SDK keeps its listener pointer, which now
    /// resolves to a stale generation and delivers nothing.
    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some((generation, sink)) = self.generation.lock().take() {
            clear_route(generation);
            sink.set_state(self.tag(), InterceptionState::Uninstalled);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

fn clear_route(generation: usize) {
    let mut route = ROUTE.lock();
    if route.as_ref().is_some_and(|r| r.generation == generation) {
        *route = None;
    }
}


#[cfg(test)]
mod tests {
    use super::fake_vendor::{self, INIT_CALLS, INIT_RESULT, SERIAL};
    use super::*;
    use crate::models::config::EngineConfiguration;
    use crate::strategies::test_support::Harness;
    use crate::testing::{wait_until, MockSymbols};
    use std::time::Duration;

    fn vendor_symbols() -> MockSymbols {
        MockSymbols::new()
            .with("pcmp2_init", fake_vendor::init_address())
            .with("pcmp2_setListener", fake_vendor::set_listener_address())
    }

    #[test]
    fn listener_frames_reach_the_sink() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        let harness = Harness::with_symbols(vendor_symbols());
        let capture = VendorListenerCapture::new();

        capture.start(&harness.ctx).unwrap();
        fake_vendor::emit(&[0x10, 0x00, 0xF0, 0xFF]);
        harness.ctx.sink.deliver_pending();

        assert_eq!(INIT_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(harness.delegate.samples_for(StrategyTag::VendorListener), vec![16, -16]);
        assert_eq!(harness.ctx.sink.state(StrategyTag::VendorListener), InterceptionState::Active);
        capture.stop();
    }

    #[test]
    fn alaw_payload_is_decoded() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        let config = EngineConfiguration {
            listener_payload: ListenerPayload::Alaw,
            ..EngineConfiguration::default()
        };
        let harness = Harness::with(config, vendor_symbols());
        let capture = VendorListenerCapture::new();

        capture.start(&harness.ctx).unwrap();
        fake_vendor::emit(&[0x55, 0xD5]);
        harness.ctx.sink.deliver_pending();
        capture.stop();

        assert_eq!(harness.delegate.samples_for(StrategyTag::VendorListener), vec![-8, 8]);
    }

    #[test]
    fn stopped_listener_delivers_nothing() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        let harness = Harness::with_symbols(vendor_symbols());
        let capture = VendorListenerCapture::new();

        capture.start(&harness.ctx).unwrap();
        capture.stop();
        fake_vendor::emit(&[1, 0, 2, 0]);

        assert_eq!(harness.ctx.sink.frames_for(StrategyTag::VendorListener), 0);
        assert!(!capture.is_active());
        assert_eq!(harness.ctx.sink.state(StrategyTag::VendorListener), InterceptionState::Uninstalled);
    }

    #[test]
    fn no_frames_land_after_stop_returns() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        let harness = Harness::with_symbols(vendor_symbols());
        let capture = VendorListenerCapture::new();
        capture.start(&harness.ctx).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let emitter = {
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    fake_vendor::emit(&[1, 0, 2, 0]);
                }
            })
        };
        let sink = &harness.ctx.sink;
        assert!(wait_until(Duration::from_secs(2), || sink.frames_for(StrategyTag::VendorListener) > 0));

        capture.stop();
        let at_stop = sink.frames_for(StrategyTag::VendorListener);
        std::thread::sleep(Duration::from_millis(50));
        let later = sink.frames_for(StrategyTag::VendorListener);
        done.store(true, Ordering::SeqCst);
        emitter.join().unwrap();

        assert_eq!(later, at_stop);
    }

    #[test]
    fn missing_setup_symbol_has_no_side_effects() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        let symbols = MockSymbols::new().with("pcmp2_init", fake_vendor::init_address());
        let harness = Harness::with_symbols(symbols);

        let err = VendorListenerCapture::new().start(&harness.ctx).unwrap_err();

        assert_eq!(err, InterceptError::SymbolNotFound(vec!["pcmp2_setListener".into()]));
        assert_eq!(INIT_CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(harness.ctx.sink.state(StrategyTag::VendorListener), InterceptionState::Uninstalled);
    }

    #[test]
    fn init_failure_is_reported() {
        let _serial = SERIAL.lock();
        fake_vendor::reset();
        INIT_RESULT.store(-3, Ordering::SeqCst);
        let harness = Harness::with_symbols(vendor_symbols());
        let capture = VendorListenerCapture::new();

        let err = capture.start(&harness.ctx).unwrap_err();

        assert!(matches!(err, InterceptError::InterceptFailed(_)));
        assert!(!capture.is_active());
        assert_eq!(harness.ctx.sink.state(StrategyTag::VendorListener), InterceptionState::Failed);
    }
}
