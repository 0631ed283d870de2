//! Purpose: Single error type for discovery, loading, binding, and native calls.
//! Exports: `Error`, `ErrorKind`, `LoadFailure`, `to_exit_code`.
//! Role: Every fallible operation in the crate returns this type.
//! Invariants: `Error` is `Clone` so a cached terminal failure can be handed out verbatim.
//! Invariants: Exit-code mapping is stable once published.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Io,
    DiscoveryFailed,
    InvalidOverride,
    LoadFailed,
    BindingIncomplete,
    NativeCallFailed,
    Unsupported,
}

/// Why a located shared object could not be brought into the process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadFailure {
    Missing,
    PermissionDenied,
    ArchitectureMismatch,
    UnresolvedDependency,
    Other,
}

impl LoadFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadFailure::Missing => "missing",
            LoadFailure::PermissionDenied => "permission_denied",
            LoadFailure::ArchitectureMismatch => "architecture_mismatch",
            LoadFailure::UnresolvedDependency => "unresolved_dependency",
            LoadFailure::Other => "other",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    tried: Vec<PathBuf>,
    missing: Vec<String>,
    load_failure: Option<LoadFailure>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            tried: Vec::new(),
            missing: Vec::new(),
            load_failure: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Candidate locations probed before giving up, in probe order.
    pub fn tried(&self) -> &[PathBuf] {
        &self.tried
    }

    /// Native symbols that were required but not exported (or mis-declared).
    pub fn missing_symbols(&self) -> &[String] {
        &self.missing
    }

    pub fn load_failure(&self) -> Option<LoadFailure> {
        self.load_failure
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_tried(mut self, tried: Vec<PathBuf>) -> Self {
        self.tried = tried;
        self
    }

    pub fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_load_failure(mut self, failure: LoadFailure) -> Self {
        self.load_failure = Some(failure);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(failure) = self.load_failure {
            write!(f, " (load failure: {})", failure.as_str())?;
        }
        if !self.missing.is_empty() {
            write!(f, " (symbols: {})", self.missing.join(", "))?;
        }
        if !self.tried.is_empty() {
            write!(f, " (tried {} locations)", self.tried.len())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Io => 3,
        ErrorKind::DiscoveryFailed => 4,
        ErrorKind::InvalidOverride => 5,
        ErrorKind::LoadFailed => 6,
        ErrorKind::BindingIncomplete => 7,
        ErrorKind::NativeCallFailed => 8,
        ErrorKind::Unsupported => 9,
    }
}
