use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::config::SdkLayout;
use crate::models::error::InterceptError;
use crate::models::instance::{Capabilities, ConnectionHandle, DiscoveredInstance, InstanceKind, InstanceSummary};
use crate::traits::hardware_io::HardwareIo;
use crate::traits::object_graph::{CandidateHandle, ObjectGraph};

/// A hardware I/O handle together with the player that owns it.
#[derive(Clone)]
pub struct AudioUnitCandidate {
    /// Kind `AudioUnitHandle`; `handle` is the owning player's proxy.
    pub instance: DiscoveredInstance,
    pub io: Arc<dyn HardwareIo>,
}

/// Finds live player objects and records what they expose.
///
/// Candidates come from the object graph scan plus any receivers recorded
/// by the instance-capture intercept. Capabilities are inspected once per
/// address and cached; liveness is re-checked on every selection.
pub struct InstanceDiscoverer {
    objects: Arc<dyn ObjectGraph>,
    layout: SdkLayout,
    captured: Mutex<Vec<usize>>,
    /// Keyed by (type name, address); only live objects are cached.
    capabilities: Mutex<HashMap<(String, usize), Capabilities>>,
    selected: Mutex<Vec<InstanceSummary>>,
}

impl InstanceDiscoverer {
    pub fn new(objects: Arc<dyn ObjectGraph>, layout: SdkLayout) -> Self {
        Self {
            objects,
            layout,
            captured: Mutex::new(Vec::new()),
            capabilities: Mutex::new(HashMap::new()),
            selected: Mutex::new(Vec::new()),
        }
    }

    pub fn layout(&self) -> &SdkLayout {
        &self.layout
    }

    /// Record a player address observed as the receiver of an intercepted call.
    pub fn note_receiver(&self, address: usize) {
        if address == 0 {
            return;
        }
        let mut captured = self.captured.lock();
        if !captured.contains(&address) {
            log::debug!("captured player receiver {:#x}", address);
            captured.push(address);
        }
    }

    /// Point-in-time scan for player instances.
    ///
    /// The candidate list is fixed when this is called; probing happens as
    /// the iterator advances. An unknown type yields an empty sequence.
    pub fn discover_player_instances(&self) -> Discovery<'_> {
        let type_name = &self.layout.player_type;
        let mut seen = HashSet::new();
        let mut candidates: Vec<Arc<dyn CandidateHandle>> = Vec::new();

        match self.objects.live_instances(type_name) {
            Some(live) => {
                for handle in live {
                    if seen.insert(handle.address()) {
                        candidates.push(handle);
                    }
                }
            }
            None => log::debug!("runtime has no type named {}", type_name),
        }

        let captured = self.captured.lock().clone();
        for address in captured {
            if seen.contains(&address) {
                continue;
            }
            if let Some(handle) = self.objects.handle_for(type_name, address) {
                seen.insert(address);
                candidates.push(handle);
            }
        }

        self.evict_gone(type_name, &candidates);

        Discovery {
            discoverer: self,
            scanned_at: Utc::now(),
            pending: candidates.into_iter(),
        }
    }

    /// The most recent live player exposing every capability in `required`.
    pub fn select_player(&self, required: Capabilities) -> Result<DiscoveredInstance, InterceptError> {
        let chosen = self
            .discover_player_instances()
            .filter(|i| i.capabilities.contains(required))
            .filter(|i| i.handle.is_alive())
            .last()
            .ok_or_else(|| {
                InterceptError::InstanceNotFound(format!(
                    "no live {} exposing {:?}",
                    self.layout.player_type, required
                ))
            })?;
        self.remember(chosen.summary());
        Ok(chosen)
    }

    /// The hardware I/O handle of the most recent player that has one.
    pub fn select_audio_unit(&self) -> Result<AudioUnitCandidate, InterceptError> {
        let player = self.select_player(Capabilities::AUDIO_UNIT)?;
        let io = player
            .handle
            .hardware_io(&self.layout.audio_unit_field)
            .ok_or_else(|| {
                InterceptError::InstanceNotFound(format!(
                    "{} at {:#x} has no {}",
                    self.layout.player_type, player.address, self.layout.audio_unit_field
                ))
            })?;
        let instance = DiscoveredInstance {
            kind: InstanceKind::AudioUnitHandle,
            address: io.address(),
            discovered_at: Utc::now(),
            capabilities: Capabilities::empty(),
            handle: player.handle,
        };
        self.remember(instance.summary());
        Ok(AudioUnitCandidate { instance, io })
    }

    /// Client connection pointer stored on `player`, if set.
    pub fn client_of(&self, player: &DiscoveredInstance) -> Option<ConnectionHandle> {
        if !player.capabilities.contains(Capabilities::CLIENT) {
            return None;
        }
        let raw = player.handle.read_pointer(&self.layout.client_field).ok()?;
        let connection = ConnectionHandle::new(raw)?;
        self.remember(InstanceSummary {
            kind: InstanceKind::ClientConnection,
            address: format!("{:#x}", raw),
            discovered_at: Utc::now(),
            capabilities: Vec::new(),
        });
        Some(connection)
    }

    /// Instances most recently chosen by strategies, oldest first.
    pub fn selected(&self) -> Vec<InstanceSummary> {
        self.selected.lock().clone()
    }

    /// Forget cached capabilities and captured receivers for objects this scan did not find alive.
    fn evict_gone(&self, type_name: &str, candidates: &[Arc<dyn CandidateHandle>]) {
        let live: HashSet<usize> = candidates
            .iter()
            .filter(|h| h.is_alive())
            .map(|h| h.address())
            .collect();
        self.capabilities
            .lock()
            .retain(|(ty, address), _| ty == type_name && live.contains(address));
        self.captured.lock().retain(|address| live.contains(address));
    }

    fn inspect(&self, handle: &dyn CandidateHandle) -> Capabilities {
        let key = (self.layout.player_type.clone(), handle.address());
        if let Some(caps) = self.capabilities.lock().get(&key) {
            return *caps;
        }

        let mut caps = Capabilities::empty();
        if handle.has_field(&self.layout.audio_unit_field) {
            caps |= Capabilities::AUDIO_UNIT;
        }
        if handle.has_field(&self.layout.voice_frame_field) {
            caps |= Capabilities::VOICE_FRAME;
        }
        if handle.has_field(&self.layout.output_buffer_field) {
            caps |= Capabilities::OUTPUT_BUFFER;
        }
        if handle.has_field(&self.layout.client_field) {
            caps |= Capabilities::CLIENT;
        }
        if handle.is_alive() {
            self.capabilities.lock().insert(key, caps);
        }
        caps
    }

    fn remember(&self, summary: InstanceSummary) {
        const KEEP: usize = 16;
        let mut selected = self.selected.lock();
        selected.retain(|s| !(s.kind == summary.kind && s.address == summary.address));
        selected.push(summary);
        if selected.len() > KEEP {
            let excess = selected.len() - KEEP;
            selected.drain(..excess);
        }
    }
}

/// Lazy, finite, single-pass result of one scan.
pub struct Discovery<'a> {
    discoverer: &'a InstanceDiscoverer,
    scanned_at: DateTime<Utc>,
    pending: std::vec::IntoIter<Arc<dyn CandidateHandle>>,
}

impl Discovery<'_> {
    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }
}

impl Iterator for Discovery<'_> {
    type Item = DiscoveredInstance;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.pending.next()?;
        let capabilities = self.discoverer.inspect(handle.as_ref());
        Some(DiscoveredInstance {
            kind: InstanceKind::Player,
            address: handle.address(),
            discovered_at: self.scanned_at,
            capabilities,
            handle,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}
