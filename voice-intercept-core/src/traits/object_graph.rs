use std::sync::Arc;

use crate::models::error::InterceptError;
use crate::traits::hardware_io::HardwareIo;

/// Proxy for one live object of an undeclared SDK type.
///
/// Implementations hold the object's address only and must not keep it
/// alive. Every accessor is side-effect free on the SDK side except
/// [`write_pointer`](Self::write_pointer).
pub trait CandidateHandle: Send + Sync {
    fn address(&self) -> usize;

    /// Whether the object exposes a field with this runtime name.
    fn has_field(&self, field: &str) -> bool;

    /// Cheap liveness check. `false` means the object should be treated as gone.
    fn is_alive(&self) -> bool;

    /// Contents of a byte-buffer field. `Ok(None)` when the field is null or empty.
    fn read_bytes(&self, field: &str) -> Result<Option<Vec<u8>>, InterceptError>;

    /// Raw value of a pointer-sized field.
    fn read_pointer(&self, field: &str) -> Result<usize, InterceptError>;

    /// Overwrite a pointer-sized field.
    fn write_pointer(&self, field: &str, value: usize) -> Result<(), InterceptError>;

    /// The hardware I/O handle stored in `field`, if any.
    fn hardware_io(&self, field: &str) -> Option<Arc<dyn HardwareIo>>;
}

/// The host runtime's view of live objects.
pub trait ObjectGraph: Send + Sync {
    /// Live instances of `type_name` in creation order.
    ///
    /// `None` when the runtime knows no type by that name.
    fn live_instances(&self, type_name: &str) -> Option<Vec<Arc<dyn CandidateHandle>>>;

    /// Wrap a known object address, e.g. a receiver recorded by an intercept.
    fn handle_for(&self, type_name: &str, address: usize) -> Option<Arc<dyn CandidateHandle>>;
}
