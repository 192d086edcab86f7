use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::error::InterceptError;
use crate::traits::method_table::{CallFrame, MethodImp, MethodTable};

/// In-process type → operation → implementation table.
///
/// For SDK entry points the host routes through a table it controls, and
/// for the engine self-test. Calls clone the implementation under a read
/// lock and run it unlocked, so an implementation may itself dispatch.
#[derive(Default)]
pub struct DispatchTable {
    entries: RwLock<HashMap<(String, String), MethodImp>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine an operation.
    pub fn define(&self, type_name: &str, operation: &str, imp: MethodImp) {
        self.entries
            .write()
            .insert((type_name.to_string(), operation.to_string()), imp);
    }

    /// Call an operation. `None` if it is not defined.
    pub fn invoke(&self, type_name: &str, operation: &str, frame: &CallFrame<'_>) -> Option<isize> {
        let imp = self.implementation(type_name, operation)?;
        Some(imp(frame))
    }
}

impl MethodTable for DispatchTable {
    fn implementation(&self, type_name: &str, operation: &str) -> Option<MethodImp> {
        self.entries
            .read()
            .get(&(type_name.to_string(), operation.to_string()))
            .cloned()
    }

    fn exchange(
        &self,
        type_name: &str,
        operation: &str,
        imp: MethodImp,
    ) -> Result<MethodImp, InterceptError> {
        let mut entries = self.entries.write();
        let slot = entries
            .get_mut(&(type_name.to_string(), operation.to_string()))
            .ok_or_else(|| {
                InterceptError::InterceptFailed(format!("{}::{} is not defined", type_name, operation))
            })?;
        Ok(std::mem::replace(slot, imp))
    }
}
