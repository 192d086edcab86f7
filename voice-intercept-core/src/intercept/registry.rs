use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::InterceptMode;
use crate::models::error::InterceptError;
use crate::traits::hardware_io::HardwareIo;
use crate::traits::method_table::{CallFrame, MethodImp, MethodTable};

/// Observer run before (or instead of) the displaced implementation.
pub type InterceptHook = Arc<dyn Fn(&CallFrame<'_>) + Send + Sync + 'static>;

/// Identity of an intercepted operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptKey {
    pub type_name: String,
    pub operation: String,
}

impl InterceptKey {
    pub fn new(type_name: &str, operation: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl fmt::Display for InterceptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.operation)
    }
}

struct Installed {
    original: MethodImp,
    replacement: MethodImp,
}

/// The single place where SDK operations get replaced.
///
/// Entries are keyed by `(type, operation)` and apply to every instance of
/// the type until removed. `remove_intercept` puts back the exact
/// implementation recorded at install time.
pub struct InterceptorRegistry {
    methods: Option<Arc<dyn MethodTable>>,
    mode: InterceptMode,
    installed: Mutex<HashMap<InterceptKey, Installed>>,
}

impl InterceptorRegistry {
    pub fn new(methods: Option<Arc<dyn MethodTable>>, mode: InterceptMode) -> Self {
        Self {
            methods,
            mode,
            installed: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> InterceptMode {
        self.mode
    }

    /// Route `type_name::operation` through `hook`.
    ///
    /// In `Augment` mode the original always runs after the hook; in
    /// `Suppress` mode it never does and the call returns 0. Installing an
    /// already-installed key is a no-op.
    pub fn install_intercept(
        &self,
        type_name: &str,
        operation: &str,
        hook: InterceptHook,
    ) -> Result<(), InterceptError> {
        self.install_intercept_with_mode(type_name, operation, hook, self.mode)
    }

    /// Like [`install_intercept`](Self::install_intercept) with an explicit mode
    /// for this one entry.
    pub fn install_intercept_with_mode(
        &self,
        type_name: &str,
        operation: &str,
        hook: InterceptHook,
        mode: InterceptMode,
    ) -> Result<(), InterceptError> {
        let methods = self.methods.as_ref().ok_or_else(|| {
            InterceptError::InterceptFailed("no method table available for this runtime".into())
        })?;
        let key = InterceptKey::new(type_name, operation);

        let mut installed = self.installed.lock();
        if installed.contains_key(&key) {
            return Ok(());
        }

        let original = methods
            .implementation(type_name, operation)
            .ok_or_else(|| InterceptError::InterceptFailed(format!("{} has no implementation", key)))?;

        let forward = Arc::clone(&original);
        let replacement: MethodImp = Arc::new(move |frame: &CallFrame<'_>| {
            hook(frame);
            match mode {
                InterceptMode::Augment => forward(frame),
                InterceptMode::Suppress => 0,
            }
        });

        let displaced = methods.exchange(type_name, operation, Arc::clone(&replacement))?;
        if !Arc::ptr_eq(&displaced, &original) {
            // Someone swapped it between our read and write; back out.
            let _ = methods.exchange(type_name, operation, displaced);
            return Err(InterceptError::InterceptFailed(format!(
                "{} changed while installing",
                key
            )));
        }

        log::info!("intercept installed on {} ({:?})", key, mode);
        installed.insert(key, Installed { original, replacement });
        Ok(())
    }

    /// Restore the implementation recorded at install time. No-op if absent.
    pub fn remove_intercept(&self, type_name: &str, operation: &str) {
        let key = InterceptKey::new(type_name, operation);
        let Some(entry) = self.installed.lock().remove(&key) else {
            return;
        };
        let Some(methods) = self.methods.as_ref() else {
            return;
        };
        match methods.exchange(type_name, operation, entry.original) {
            Ok(displaced) => {
                if !Arc::ptr_eq(&displaced, &entry.replacement) {
                    log::warn!("{} was re-patched by someone else; restored original anyway", key);
                }
                log::info!("intercept removed from {}", key);
            }
            Err(e) => log::warn!("failed to restore {}: {}", key, e),
        }
    }

    pub fn remove_all(&self) {
        for key in self.installed_keys() {
            self.remove_intercept(&key.type_name, &key.operation);
        }
    }

    pub fn is_installed(&self, type_name: &str, operation: &str) -> bool {
        self.installed
            .lock()
            .contains_key(&InterceptKey::new(type_name, operation))
    }

    pub fn installed_keys(&self) -> Vec<InterceptKey> {
        let mut keys: Vec<_> = self.installed.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Gate for tapping a hardware I/O handle.
    ///
    /// Only a stopped or inspectable unit may be tapped; a running one is
    /// owned by the SDK's audio thread.
    pub fn confirm_inspectable(&self, io: &dyn HardwareIo) -> Result<(), InterceptError> {
        let state = io.state();
        if state.permits_tap() {
            Ok(())
        } else {
            Err(InterceptError::InterceptFailed(format!(
                "hardware I/O {:#x} is {:?}, not stopped or inspectable",
                io.address(),
                state
            )))
        }
    }
}
