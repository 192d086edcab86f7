//! Exported-symbol lookup through the platform dynamic loader.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use voice_intercept_core::models::error::InterceptError;
use voice_intercept_core::traits::symbol_source::SymbolSource;

struct LoadedImage {
    label: String,
    library: Library,
}

/// [`SymbolSource`] backed by `dlsym` / `GetProcAddress`.
///
/// Starts with the process's global symbol scope. Extra images (the SDK's
/// own shared library, when it is not linked into the executable) are
/// opened with [`with_library`](Self::with_library) and searched in the
/// order they were added, after the process scope.
///
/// The libraries stay open for the lifetime of the source, so resolved
/// addresses remain valid as long as it is alive.
pub struct DylibSymbolSource {
    images: Vec<LoadedImage>,
}

impl DylibSymbolSource {
    /// Source that searches the running process.
    pub fn process() -> Result<Self, InterceptError> {
        Ok(Self {
            images: vec![LoadedImage {
                label: "<process>".into(),
                library: this_process()?,
            }],
        })
    }

    /// Source that searches only the given image.
    pub fn library(path: impl AsRef<Path>) -> Result<Self, InterceptError> {
        Self { images: Vec::new() }.with_library(path)
    }

    /// Open another shared library and add it to the search path.
    pub fn with_library(mut self, path: impl AsRef<Path>) -> Result<Self, InterceptError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        // SAFETY: Opening a library runs its initializers; the caller picks
        // an image that is already part of the host process's SDK.
        let library = unsafe { Library::new(&path) }.map_err(|e| {
            InterceptError::ConfigurationFailed(format!("failed to load {}: {}", path.display(), e))
        })?;
        log::debug!("symbol source opened {}", path.display());
        self.images.push(LoadedImage {
            label: path.display().to_string(),
            library,
        });
        Ok(self)
    }

    /// Labels of the searched images in lookup order.
    pub fn images(&self) -> Vec<String> {
        self.images.iter().map(|i| i.label.clone()).collect()
    }
}

impl SymbolSource for DylibSymbolSource {
    fn lookup(&self, name: &str) -> Option<usize> {
        if name.is_empty() || name.contains('\0') {
            return None;
        }
        self.images.iter().find_map(|image| {
            // SAFETY: The symbol is only read as an address, never called here.
            let symbol: Symbol<'_, *const c_void> = unsafe { image.library.get(name.as_bytes()) }.ok()?;
            let address = *symbol as usize;
            (address != 0).then(|| {
                log::trace!("{} found in {}", name, image.label);
                address
            })
        })
    }
}

#[cfg(unix)]
fn this_process() -> Result<Library, InterceptError> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_process() -> Result<Library, InterceptError> {
    libloading::os::windows::Library::this()
        .map(Into::into)
        .map_err(|e| InterceptError::ConfigurationFailed(format!("failed to open process image: {}", e)))
}
