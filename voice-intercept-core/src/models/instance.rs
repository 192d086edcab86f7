use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::traits::object_graph::CandidateHandle;

/// Kind of SDK object the engine has located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Player,
    AudioUnitHandle,
    ClientConnection,
}

bitflags! {
    /// What a candidate object was observed to expose, inspected once per address.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const AUDIO_UNIT = 0b0001;
        const VOICE_FRAME = 0b0010;
        const OUTPUT_BUFFER = 0b0100;
        const CLIENT = 0b1000;
    }
}

impl Capabilities {
    pub fn labels(self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.contains(Self::AUDIO_UNIT) {
            labels.push("audio_unit");
        }
        if self.contains(Self::VOICE_FRAME) {
            labels.push("voice_frame");
        }
        if self.contains(Self::OUTPUT_BUFFER) {
            labels.push("output_buffer");
        }
        if self.contains(Self::CLIENT) {
            labels.push("client");
        }
        labels
    }
}

/// A live SDK object found at runtime.
///
/// The engine never owns the object. `handle` is a proxy holding only its
/// address; the SDK may free the object at any time, so every use goes
/// through the handle's fallible accessors.
#[derive(Clone)]
pub struct DiscoveredInstance {
    pub kind: InstanceKind,
    pub address: usize,
    pub discovered_at: DateTime<Utc>,
    pub capabilities: Capabilities,
    pub handle: Arc<dyn CandidateHandle>,
}

impl DiscoveredInstance {
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            kind: self.kind,
            address: format!("{:#x}", self.address),
            discovered_at: self.discovered_at,
            capabilities: self.capabilities.labels(),
        }
    }
}

impl fmt::Debug for DiscoveredInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredInstance")
            .field("kind", &self.kind)
            .field("address", &format_args!("{:#x}", self.address))
            .field("discovered_at", &self.discovered_at)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Serializable view of a [`DiscoveredInstance`] for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    pub kind: InstanceKind,
    pub address: String,
    pub discovered_at: DateTime<Utc>,
    pub capabilities: Vec<&'static str>,
}

/// Opaque connection handle supplied by the host once a session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(usize);

impl ConnectionHandle {
    /// Returns `None` for a null handle.
    pub fn new(raw: usize) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}
