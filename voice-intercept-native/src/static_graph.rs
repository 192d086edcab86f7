//! Object graph that finds SDK instances through exported pointer slots.

use std::collections::HashMap;
use std::ptr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use voice_intercept_core::models::error::InterceptError;
use voice_intercept_core::traits::object_graph::{CandidateHandle, ObjectGraph};
use voice_intercept_core::traits::symbol_source::SymbolSource;

use crate::raw_object::{ObjectLayout, RawObjectHandle};

/// One SDK type: its layout plus the global variables that point at instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBinding {
    #[serde(flatten)]
    pub layout: ObjectLayout,
    /// Exported names of pointer-sized globals, e.g. a shared-instance slot.
    #[serde(default)]
    pub slots: Vec<String>,
}

/// Serialized form of a [`StaticSlotObjectGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfiguration {
    pub types: Vec<TypeBinding>,
}

impl GraphConfiguration {
    pub fn from_json_str(json: &str) -> Result<Self, InterceptError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InterceptError::ConfigurationFailed(format!("invalid object graph: {}", e)))?;
        for binding in &config.types {
            binding.layout.validate()?;
        }
        Ok(config)
    }
}

struct BoundType {
    layout: Arc<ObjectLayout>,
    slots: Vec<String>,
}

/// [`ObjectGraph`] for SDKs that publish instances through static slots.
///
/// Each registered type names the globals holding pointers to its live
/// objects. A scan resolves every slot, reads it, and wraps non-null
/// values that pass the layout's signature check. Types that were never
/// registered are unknown to this graph.
pub struct StaticSlotObjectGraph {
    symbols: Arc<dyn SymbolSource>,
    types: HashMap<String, BoundType>,
}

impl StaticSlotObjectGraph {
    pub fn new(symbols: Arc<dyn SymbolSource>) -> Self {
        Self {
            symbols,
            types: HashMap::new(),
        }
    }

    pub fn from_configuration(
        symbols: Arc<dyn SymbolSource>,
        config: GraphConfiguration,
    ) -> Result<Self, InterceptError> {
        config
            .types
            .into_iter()
            .try_fold(Self::new(symbols), |graph, binding| graph.register(binding))
    }

    /// Add a type. A later binding for the same type name replaces the earlier one.
    pub fn register(mut self, binding: TypeBinding) -> Result<Self, InterceptError> {
        binding.layout.validate()?;
        log::debug!(
            "object graph knows {} through {} slot(s)",
            binding.layout.type_name,
            binding.slots.len()
        );
        self.types.insert(
            binding.layout.type_name.clone(),
            BoundType {
                layout: Arc::new(binding.layout),
                slots: binding.slots,
            },
        );
        Ok(self)
    }

    fn read_slot(&self, name: &str) -> Option<usize> {
        let slot = self.symbols.lookup(name)?;
        if slot % std::mem::align_of::<usize>() != 0 {
            log::warn!("slot {} at {:#x} is misaligned", name, slot);
            return None;
        }
        // SAFETY: An exported slot is a pointer-sized global for the process lifetime.
        let value = unsafe { ptr::read_volatile(slot as *const usize) };
        (value != 0).then_some(value)
    }
}

impl ObjectGraph for StaticSlotObjectGraph {
    fn live_instances(&self, type_name: &str) -> Option<Vec<Arc<dyn CandidateHandle>>> {
        let bound = self.types.get(type_name)?;
        let mut instances: Vec<Arc<dyn CandidateHandle>> = Vec::new();
        for slot in &bound.slots {
            let Some(address) = self.read_slot(slot) else {
                continue;
            };
            if instances.iter().any(|h| h.address() == address) {
                continue;
            }
            // SAFETY: The slot holds a live instance of this type, described by its layout.
            let handle = unsafe { RawObjectHandle::new(address, Arc::clone(&bound.layout)) };
            if handle.is_alive() {
                instances.push(Arc::new(handle));
            } else {
                log::debug!("{} in slot {} failed its signature check", type_name, slot);
            }
        }
        Some(instances)
    }

    fn handle_for(&self, type_name: &str, address: usize) -> Option<Arc<dyn CandidateHandle>> {
        if address == 0 {
            return None;
        }
        let bound = self.types.get(type_name)?;
        // SAFETY: Callers pass receivers observed by an intercept on this type.
        let handle = unsafe { RawObjectHandle::new(address, Arc::clone(&bound.layout)) };
        Some(Arc::new(handle))
    }
}
