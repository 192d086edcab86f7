use std::sync::Arc;

use crate::models::error::InterceptError;

/// Arguments of one intercepted call.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame<'a> {
    /// Address of the receiving instance.
    pub receiver: usize,
    pub args: &'a [usize],
    pub payload: Option<&'a [u8]>,
}

/// Implementation of an operation. Identity (`Arc::ptr_eq`) is what gets
/// recorded and restored.
pub type MethodImp = Arc<dyn Fn(&CallFrame<'_>) -> isize + Send + Sync + 'static>;

/// Type-level dispatch table of the SDK's runtime.
///
/// Replacing an entry affects every current and future instance of the
/// type for the rest of the process.
pub trait MethodTable: Send + Sync {
    fn implementation(&self, type_name: &str, operation: &str) -> Option<MethodImp>;

    /// Install `imp` and return the implementation it displaced.
    fn exchange(
        &self,
        type_name: &str,
        operation: &str,
        imp: MethodImp,
    ) -> Result<MethodImp, InterceptError>;
}
