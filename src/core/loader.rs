//! Purpose: Bring the resolved libyogrt shared object into the process.
//! Exports: `NativeLibrary`, `LoadedLibrary`, `LibraryLoader`.
//! Role: Second stage of the discover -> load -> bind chain.
//! Invariants: One `dlopen` per path per loader; repeat requests get the cached handle.
//! Invariants: Libraries are never unloaded while the loader (or a bound symbol table) lives.
//! Invariants: All `libloading` interaction is confined to this module.
//! Invariants: Candidates are tried in order; the first candidate's failure is the one reported.
use std::collections::HashMap;
use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::core::error::{Error, ErrorKind, LoadFailure};
use crate::core::resolve::ResolvedLocation;

/// Anything that can hand out the address of an exported C symbol.
pub trait NativeLibrary: Send + Sync {
    fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>>;
}

#[derive(Debug)]
pub struct LoadedLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl LoadedLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NativeLibrary for LoadedLibrary {
    fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
        let mut symbol = Vec::with_capacity(name.len() + 1);
        symbol.extend_from_slice(name.as_bytes());
        symbol.push(0);
        // SAFETY: the symbol is read as an opaque address and never dereferenced here.
        let address = unsafe { self.library.get::<*mut c_void>(&symbol) }.ok()?;
        NonNull::new(*address)
    }
}

#[derive(Default)]
pub struct LibraryLoader {
    loaded: Mutex<HashMap<PathBuf, Arc<LoadedLibrary>>>,
}

static GLOBAL_LOADER: OnceLock<LibraryLoader> = OnceLock::new();

impl LibraryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide loader; never dropped, so its libraries stay mapped until exit.
    pub fn global() -> &'static LibraryLoader {
        GLOBAL_LOADER.get_or_init(LibraryLoader::new)
    }

    /// Load the resolved library, moving on to its fallbacks when one cannot be loaded.
    pub fn load(&self, location: &ResolvedLocation) -> Result<Arc<LoadedLibrary>, Error> {
        let mut first_err: Option<Error> = None;
        let mut tried = Vec::new();
        for path in location.library_candidates() {
            tried.push(path.to_path_buf());
            match self.load_path(path) {
                Ok(library) => return Ok(library),
                Err(err) => {
                    tracing::warn!(
                        library = %path.display(),
                        error = %err,
                        "library candidate failed to load"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        let err = first_err.unwrap_or_else(|| {
            Error::new(ErrorKind::LoadFailed).with_message("no library candidates")
        });
        Err(if tried.len() > 1 { err.with_tried(tried) } else { err })
    }

    pub fn load_path(&self, path: &Path) -> Result<Arc<LoadedLibrary>, Error> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = loaded.get(path) {
            tracing::debug!(library = %path.display(), "reusing loaded library");
            return Ok(Arc::clone(library));
        }

        precheck(path)?;
        // SAFETY: loading runs the library's initializers; libyogrt is trusted by the operator
        // who installed it or pointed the override variables at it.
        let library = unsafe { libloading::Library::new(path) }.map_err(|err| {
            let failure = classify(&err.to_string());
            Error::new(ErrorKind::LoadFailed)
                .with_message("failed to load shared object")
                .with_path(path)
                .with_load_failure(failure)
                .with_source(err)
        })?;

        tracing::info!(library = %path.display(), "loaded native library");
        let library = Arc::new(LoadedLibrary {
            path: path.to_path_buf(),
            library,
        });
        loaded.insert(path.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }
}

fn precheck(path: &Path) -> Result<(), Error> {
    let err = match File::open(path) {
        Ok(_) => return Ok(()),
        Err(err) => err,
    };
    let failure = match err.kind() {
        io::ErrorKind::NotFound => LoadFailure::Missing,
        io::ErrorKind::PermissionDenied => LoadFailure::PermissionDenied,
        _ => LoadFailure::Other,
    };
    Err(Error::new(ErrorKind::LoadFailed)
        .with_message("shared object is not readable")
        .with_path(path)
        .with_load_failure(failure)
        .with_source(err))
}

fn classify(message: &str) -> LoadFailure {
    let lower = message.to_ascii_lowercase();
    if lower.contains("wrong elf class")
        || lower.contains("elf machine")
        || lower.contains("architecture")
    {
        LoadFailure::ArchitectureMismatch
    } else if lower.contains("undefined symbol")
        || lower.contains("cannot open shared object file")
        || lower.contains("library not loaded")
        || lower.contains("symbol not found")
    {
        LoadFailure::UnresolvedDependency
    } else if lower.contains("permission denied") {
        LoadFailure::PermissionDenied
    } else {
        LoadFailure::Other
    }
}
