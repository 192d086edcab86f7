//! Mock SDK used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::InterceptError;
use crate::models::samples::SampleBatch;
use crate::models::state::{InterceptionState, StrategyTag};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::hardware_io::{HardwareIo, IoState, RenderCycle, RenderNotify};
use crate::traits::object_graph::{CandidateHandle, ObjectGraph};
use crate::traits::symbol_source::SymbolSource;

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Default)]
pub struct MockSymbols {
    table: HashMap<String, usize>,
    lookups: Mutex<HashMap<String, usize>>,
}

impl MockSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, address: usize) -> Self {
        self.table.insert(name.to_string(), address);
        self
    }

    pub fn lookup_count(&self, name: &str) -> usize {
        self.lookups.lock().get(name).copied().unwrap_or(0)
    }
}

impl SymbolSource for MockSymbols {
    fn lookup(&self, name: &str) -> Option<usize> {
        *self.lookups.lock().entry(name.to_string()).or_insert(0) += 1;
        self.table.get(name).copied()
    }
}

#[derive(Debug, Clone)]
pub enum MockField {
    Bytes(Option<Vec<u8>>),
    Pointer(usize),
    /// Reads fail as if the backing memory were freed mid-read.
    Corrupt,
}

pub struct MockHandle {
    address: usize,
    fields: Mutex<HashMap<String, MockField>>,
    hardware: Mutex<HashMap<String, Arc<MockHardware>>>,
    alive: AtomicBool,
    writes: AtomicUsize,
    read_delay_ms: AtomicU64,
}

impl MockHandle {
    pub fn new(address: usize) -> Arc<Self> {
        Arc::new(Self {
            address,
            fields: Mutex::new(HashMap::new()),
            hardware: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
            read_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn set_field(&self, field: &str, value: MockField) {
        self.fields.lock().insert(field.to_string(), value);
    }

    pub fn set_bytes(&self, field: &str, bytes: &[u8]) {
        self.set_field(field, MockField::Bytes(Some(bytes.to_vec())));
    }

    pub fn set_pointer(&self, field: &str, value: usize) {
        self.set_field(field, MockField::Pointer(value));
    }

    pub fn set_hardware(&self, field: &str, hardware: Arc<MockHardware>) {
        self.hardware.lock().insert(field.to_string(), hardware);
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every `read_bytes` block this long, like a read racing the SDK.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn pointer(&self, field: &str) -> Option<usize> {
        match self.fields.lock().get(field) {
            Some(MockField::Pointer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CandidateHandle for MockHandle {
    fn address(&self) -> usize {
        self.address
    }

    fn has_field(&self, field: &str) -> bool {
        self.fields.lock().contains_key(field) || self.hardware.lock().contains_key(field)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn read_bytes(&self, field: &str) -> Result<Option<Vec<u8>>, InterceptError> {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        match self.fields.lock().get(field) {
            Some(MockField::Bytes(bytes)) => Ok(bytes.clone()),
            Some(MockField::Pointer(_)) => Err(InterceptError::DecodeAnomaly(format!("{} is a pointer", field))),
            Some(MockField::Corrupt) => Err(InterceptError::DecodeAnomaly(format!("{} unreadable", field))),
            None => Err(InterceptError::InstanceNotFound(format!("no field {}", field))),
        }
    }

    fn read_pointer(&self, field: &str) -> Result<usize, InterceptError> {
        self.pointer(field)
            .ok_or_else(|| InterceptError::InstanceNotFound(format!("no pointer field {}", field)))
    }

    fn write_pointer(&self, field: &str, value: usize) -> Result<(), InterceptError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_pointer(field, value);
        Ok(())
    }

    fn hardware_io(&self, field: &str) -> Option<Arc<dyn HardwareIo>> {
        self.hardware
            .lock()
            .get(field)
            .map(|h| Arc::clone(h) as Arc<dyn HardwareIo>)
    }
}

#[derive(Default)]
pub struct MockObjectGraph {
    types: Mutex<HashMap<String, Vec<Arc<MockHandle>>>>,
    /// Reachable by address but invisible to scans.
    hidden: Mutex<HashMap<String, Vec<Arc<MockHandle>>>>,
}

impl MockObjectGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, type_name: &str, handle: Arc<MockHandle>) {
        self.types
            .lock()
            .entry(type_name.to_string())
            .or_default()
            .push(handle);
    }

    /// Add an instance a scan cannot see, as if created before scanning was possible.
    pub fn add_hidden(&self, type_name: &str, handle: Arc<MockHandle>) {
        self.declare(type_name);
        self.hidden
            .lock()
            .entry(type_name.to_string())
            .or_default()
            .push(handle);
    }

    /// Register a type with no live instances.
    pub fn declare(&self, type_name: &str) {
        self.types.lock().entry(type_name.to_string()).or_default();
    }
}

impl ObjectGraph for MockObjectGraph {
    fn live_instances(&self, type_name: &str) -> Option<Vec<Arc<dyn CandidateHandle>>> {
        self.types.lock().get(type_name).map(|handles| {
            handles
                .iter()
                .map(|h| Arc::clone(h) as Arc<dyn CandidateHandle>)
                .collect()
        })
    }

    fn handle_for(&self, type_name: &str, address: usize) -> Option<Arc<dyn CandidateHandle>> {
        let find = |map: &HashMap<String, Vec<Arc<MockHandle>>>| {
            map.get(type_name).and_then(|handles| {
                handles
                    .iter()
                    .find(|h| h.address == address)
                    .map(|h| Arc::clone(h) as Arc<dyn CandidateHandle>)
            })
        };
        let visible = find(&*self.types.lock());
        visible.or_else(|| find(&*self.hidden.lock()))
    }
}

pub struct MockHardware {
    address: usize,
    state: Mutex<IoState>,
    notifies: Mutex<Vec<(u64, RenderNotify)>>,
    next_token: AtomicU64,
}

impl MockHardware {
    pub fn new(address: usize, state: IoState) -> Arc<Self> {
        Arc::new(Self {
            address,
            state: Mutex::new(state),
            notifies: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        })
    }

    pub fn set_state(&self, state: IoState) {
        *self.state.lock() = state;
    }

    pub fn notify_count(&self) -> usize {
        self.notifies.lock().len()
    }

    /// Drive one render cycle through every attached notify.
    pub fn render(&self, samples: &[i16], channels: u16) {
        let notifies: Vec<RenderNotify> = self.notifies.lock().iter().map(|(_, n)| Arc::clone(n)).collect();
        let cycle = RenderCycle {
            samples,
            channels,
            post_render: true,
        };
        for notify in notifies {
            notify(&cycle);
        }
    }
}

impl HardwareIo for MockHardware {
    fn address(&self) -> usize {
        self.address
    }

    fn state(&self) -> IoState {
        *self.state.lock()
    }

    fn add_render_notify(&self, notify: RenderNotify) -> Result<u64, InterceptError> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.notifies.lock().push((token, notify));
        Ok(token)
    }

    fn remove_render_notify(&self, token: u64) {
        self.notifies.lock().retain(|(t, _)| *t != token);
    }
}

#[derive(Default)]
pub struct CollectingDelegate {
    pub batches: Mutex<Vec<SampleBatch>>,
    pub states: Mutex<Vec<(StrategyTag, InterceptionState)>>,
    pub errors: Mutex<Vec<(StrategyTag, InterceptError)>>,
}

impl CollectingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn samples_for(&self, tag: StrategyTag) -> Vec<i16> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.strategy == tag)
            .flat_map(|b| b.samples.iter().copied())
            .collect()
    }
}

impl CaptureDelegate for CollectingDelegate {
    fn on_samples(&self, batch: &SampleBatch) {
        self.batches.lock().push(batch.clone());
    }

    fn on_state_changed(&self, strategy: StrategyTag, state: InterceptionState) {
        self.states.lock().push((strategy, state));
    }

    fn on_error(&self, strategy: StrategyTag, error: &InterceptError) {
        self.errors.lock().push((strategy, error.clone()));
    }
}
