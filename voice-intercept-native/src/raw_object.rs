//! Field access on SDK objects through a declared memory layout.

use std::collections::BTreeMap;
use std::mem;
use std::ptr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use voice_intercept_core::models::error::InterceptError;
use voice_intercept_core::traits::hardware_io::HardwareIo;
use voice_intercept_core::traits::object_graph::CandidateHandle;

/// Upper bound for any byte field read through a length word.
pub const MAX_FIELD_BYTES: usize = 1 << 20;

/// How a field is stored inside the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Pointer-sized word.
    Pointer,
    /// Fixed-size byte array embedded in the object.
    InlineBytes { len: usize },
    /// Pointer to a heap buffer whose length is a `u32` at `len_offset`.
    BytesAt { len_offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub offset: usize,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// A machine word that identifies live instances, e.g. an isa or vtable
/// pointer. Objects whose word differs are reported as not alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub offset: usize,
    pub value: u64,
}

/// Runtime field names of one SDK type mapped to their offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLayout {
    pub type_name: String,
    #[serde(default)]
    pub signature: Option<Signature>,
    pub fields: BTreeMap<String, FieldLayout>,
}

impl ObjectLayout {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            signature: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_signature(mut self, offset: usize, value: u64) -> Self {
        self.signature = Some(Signature { offset, value });
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, offset: usize, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), FieldLayout { offset, kind });
        self
    }

    /// Reject layouts whose fields could not be read safely.
    pub fn validate(&self) -> Result<(), InterceptError> {
        if self.type_name.is_empty() {
            return Err(InterceptError::ConfigurationFailed("layout type name is empty".into()));
        }
        for (name, field) in &self.fields {
            match field.kind {
                FieldKind::Pointer | FieldKind::BytesAt { .. } if field.offset % mem::align_of::<usize>() != 0 => {
                    return Err(InterceptError::ConfigurationFailed(format!(
                        "{}.{} at offset {} is not pointer-aligned",
                        self.type_name, name, field.offset
                    )));
                }
                FieldKind::InlineBytes { len } if len > MAX_FIELD_BYTES => {
                    return Err(InterceptError::ConfigurationFailed(format!(
                        "{}.{} is larger than {} bytes",
                        self.type_name, name, MAX_FIELD_BYTES
                    )));
                }
                FieldKind::BytesAt { len_offset } if len_offset % mem::align_of::<u32>() != 0 => {
                    return Err(InterceptError::ConfigurationFailed(format!(
                        "{}.{} length word at offset {} is misaligned",
                        self.type_name, name, len_offset
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// [`CandidateHandle`] over a raw object address.
///
/// Reads and writes are volatile so the SDK's own threads see pointer
/// swaps without the compiler caching fields. No retain is taken on the
/// object; the SDK owns it.
pub struct RawObjectHandle {
    address: usize,
    layout: Arc<ObjectLayout>,
}

impl RawObjectHandle {
    /// Wrap `address`.
    ///
    /// # Safety
    ///
    /// `address` must point at an object of `layout.type_name` that stays
    /// mapped while the handle is used, and every offset in `layout` must
    /// lie inside that object.
    pub unsafe fn new(address: usize, layout: Arc<ObjectLayout>) -> Self {
        Self { address, layout }
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    fn field(&self, name: &str) -> Result<&FieldLayout, InterceptError> {
        self.layout.fields.get(name).ok_or_else(|| {
            InterceptError::InstanceNotFound(format!("{} has no field {}", self.layout.type_name, name))
        })
    }

    fn word_at(&self, offset: usize) -> usize {
        // SAFETY: Offsets come from a validated layout of a live object.
        unsafe { ptr::read_volatile((self.address + offset) as *const usize) }
    }

    fn read_heap_bytes(&self, name: &str, offset: usize, len_offset: usize) -> Result<Option<Vec<u8>>, InterceptError> {
        let data = self.word_at(offset);
        // SAFETY: As for `word_at`; the length word is u32-aligned.
        let len = unsafe { ptr::read_volatile((self.address + len_offset) as *const u32) } as usize;
        if data == 0 || len == 0 {
            return Ok(None);
        }
        if len > MAX_FIELD_BYTES {
            return Err(InterceptError::DecodeAnomaly(format!(
                "{} claims {} bytes, limit is {}",
                name, len, MAX_FIELD_BYTES
            )));
        }
        // SAFETY: The SDK keeps `len` readable bytes at `data` while the field is set.
        Ok(Some(unsafe { copy_volatile(data, len) }))
    }
}

impl CandidateHandle for RawObjectHandle {
    fn address(&self) -> usize {
        self.address
    }

    fn has_field(&self, field: &str) -> bool {
        self.layout.fields.contains_key(field)
    }

    fn is_alive(&self) -> bool {
        if self.address == 0 {
            return false;
        }
        match self.layout.signature {
            Some(sig) => self.word_at(sig.offset) as u64 == sig.value,
            None => true,
        }
    }

    fn read_bytes(&self, field: &str) -> Result<Option<Vec<u8>>, InterceptError> {
        let layout = self.field(field)?;
        match layout.kind {
            FieldKind::InlineBytes { len: 0 } => Ok(None),
            // SAFETY: Inline arrays lie inside the object.
            FieldKind::InlineBytes { len } => Ok(Some(unsafe { copy_volatile(self.address + layout.offset, len) })),
            FieldKind::BytesAt { len_offset } => self.read_heap_bytes(field, layout.offset, len_offset),
            FieldKind::Pointer => Err(InterceptError::DecodeAnomaly(format!("{} is a pointer", field))),
        }
    }

    fn read_pointer(&self, field: &str) -> Result<usize, InterceptError> {
        let layout = self.field(field)?;
        match layout.kind {
            FieldKind::Pointer | FieldKind::BytesAt { .. } => Ok(self.word_at(layout.offset)),
            FieldKind::InlineBytes { .. } => Err(InterceptError::DecodeAnomaly(format!("{} is inline bytes", field))),
        }
    }

    fn write_pointer(&self, field: &str, value: usize) -> Result<(), InterceptError> {
        let layout = self.field(field)?;
        match layout.kind {
            FieldKind::Pointer | FieldKind::BytesAt { .. } => {
                // SAFETY: Pointer fields are word-aligned slots inside the object.
                unsafe { ptr::write_volatile((self.address + layout.offset) as *mut usize, value) };
                Ok(())
            }
            FieldKind::InlineBytes { .. } => {
                Err(InterceptError::InterceptFailed(format!("{} is not a pointer field", field)))
            }
        }
    }

    fn hardware_io(&self, _field: &str) -> Option<Arc<dyn HardwareIo>> {
        // Render notify needs a platform audio binding this backend does not carry.
        None
    }
}

unsafe fn copy_volatile(address: usize, len: usize) -> Vec<u8> {
    let base = address as *const u8;
    (0..len).map(|i| ptr::read_volatile(base.add(i))).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const PLAYER_MAGIC: u64 = 0x564F_4943_4550_4C59;

    #[repr(C)]
    pub struct FakePlayer {
        pub magic: u64,
        pub client: usize,
        pub voice_out_buff: usize,
        pub voice_out_len: u32,
        pub voice_frame: [u8; 4],
    }

    impl FakePlayer {
        pub fn new(frame: [u8; 4]) -> Box<Self> {
            Box::new(Self {
                magic: PLAYER_MAGIC,
                client: 0,
                voice_out_buff: 0,
                voice_out_len: 0,
                voice_frame: frame,
            })
        }

        pub fn address(&self) -> usize {
            self as *const Self as usize
        }
    }

    pub fn player_layout() -> ObjectLayout {
        ObjectLayout::new("AppIOSPlayer")
            .with_signature(mem::offset_of!(FakePlayer, magic), PLAYER_MAGIC)
            .with_field("client", mem::offset_of!(FakePlayer, client), FieldKind::Pointer)
            .with_field(
                "voice_out_buff",
                mem::offset_of!(FakePlayer, voice_out_buff),
                FieldKind::BytesAt {
                    len_offset: mem::offset_of!(FakePlayer, voice_out_len),
                },
            )
            .with_field(
                "voice_frame",
                mem::offset_of!(FakePlayer, voice_frame),
                FieldKind::InlineBytes { len: 4 },
            )
    }
}
