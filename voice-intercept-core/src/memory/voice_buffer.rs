use std::alloc::{self, Layout};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use crate::models::config::VoiceBufferLayout;
use crate::models::error::InterceptError;
use crate::traits::object_graph::CandidateHandle;

/// Engine-owned output buffer that has not been given to the SDK yet.
///
/// Freed on drop. [`hand_off`](Self::hand_off) turns it into a
/// [`HandedOffBuffer`], which is never freed.
pub struct VoiceFrameBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    fill: u8,
}

// SAFETY: the allocation is exclusively owned and only accessed through
// volatile byte reads/writes.
unsafe impl Send for VoiceFrameBuffer {}
unsafe impl Sync for VoiceFrameBuffer {}

impl VoiceFrameBuffer {
    /// Allocate `spec.capacity` bytes at `spec.alignment`, filled with `spec.fill`.
    pub fn allocate(spec: &VoiceBufferLayout) -> Result<Self, InterceptError> {
        spec.validate().map_err(InterceptError::ConfigurationFailed)?;
        let layout = Layout::from_size_align(spec.capacity, spec.alignment)
            .map_err(|e| InterceptError::ConfigurationFailed(format!("invalid buffer layout: {}", e)))?;

        // SAFETY: layout has non-zero size (validated above).
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| InterceptError::Unknown(format!("failed to allocate {} bytes", spec.capacity)))?;
        // SAFETY: freshly allocated region of layout.size() bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), spec.fill, layout.size()) };

        Ok(Self {
            ptr,
            layout,
            fill: spec.fill,
        })
    }

    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Store this buffer's address into `field` of `target`.
    ///
    /// Refuses with `BufferStateInvalid`, without writing anything, unless
    /// the field currently holds `sentinel`. On success the SDK gains read
    /// and write access for the rest of the process; ownership stays here
    /// but the memory is intentionally never released, since the SDK's own
    /// teardown cannot be observed.
    pub fn hand_off(
        self,
        target: &dyn CandidateHandle,
        field: &str,
        sentinel: usize,
    ) -> Result<HandedOffBuffer, InterceptError> {
        let current = target.read_pointer(field)?;
        if current != sentinel {
            return Err(InterceptError::BufferStateInvalid(format!(
                "{} at {:#x} holds {:#x}, expected sentinel {:#x}",
                field,
                target.address(),
                current,
                sentinel
            )));
        }

        target.write_pointer(field, self.address())?;

        let this = ManuallyDrop::new(self);
        log::info!(
            "handed {} byte buffer at {:#x} to {} at {:#x}; retained for process lifetime",
            this.len(),
            this.address(),
            field,
            target.address()
        );
        Ok(HandedOffBuffer {
            ptr: this.ptr,
            len: this.layout.size(),
            fill: this.fill,
        })
    }
}

impl Drop for VoiceFrameBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with the same layout, never handed off.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// A buffer the SDK may read and write at any time.
pub struct HandedOffBuffer {
    ptr: NonNull<u8>,
    len: usize,
    fill: u8,
}

// SAFETY: the memory is never freed and only touched with volatile accesses.
unsafe impl Send for HandedOffBuffer {}
unsafe impl Sync for HandedOffBuffer {}

impl HandedOffBuffer {
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current contents, read byte by byte.
    pub fn snapshot(&self) -> Vec<u8> {
        (0..self.len)
            // SAFETY: offset < len inside a live, never-freed allocation.
            .map(|i| unsafe { ptr::read_volatile(self.ptr.as_ptr().add(i)) })
            .collect()
    }

    /// Bytes written since the last call, up to the last non-fill byte.
    ///
    /// The returned range is re-filled so the next write is detectable.
    pub fn take_pending(&self) -> Option<Vec<u8>> {
        let snapshot = self.snapshot();
        let end = snapshot.iter().rposition(|&b| b != self.fill)? + 1;
        for i in 0..end {
            // SAFETY: i < end <= len.
            unsafe { ptr::write_volatile(self.ptr.as_ptr().add(i), self.fill) };
        }
        let mut pending = snapshot;
        pending.truncate(end);
        Some(pending)
    }
}
