//! Purpose: Pick the header and shared object the loader should use.
//! Exports: `PathResolver`, `ResolvedLocation`.
//! Role: First stage of the discover -> load -> bind chain.
//! Invariants: Overrides win outright; a set but unusable override is an error, never a fallback.
//! Invariants: Candidate order is tier order (env, standard, compiler), not filesystem order.
//! Invariants: Only read-only filesystem probes happen here.
//! Invariants: Searched libraries keep every later readable candidate so the loader can skip
//! one that fails to load; an override library has no fallbacks.
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::{INCLUDE_OVERRIDE_VAR, LIBRARY_OVERRIDE_VAR, Override, SearchConfig};
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub include_dir: PathBuf,
    pub header: PathBuf,
    pub library: PathBuf,
    pub from_override: bool,
    /// Later readable libraries, in tier order, for when `library` cannot be loaded.
    #[serde(skip)]
    pub library_fallbacks: Vec<PathBuf>,
}

impl ResolvedLocation {
    /// `library` followed by its fallbacks.
    pub fn library_candidates(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.library.as_path())
            .chain(self.library_fallbacks.iter().map(PathBuf::as_path))
    }
}

pub struct PathResolver<'a> {
    config: &'a SearchConfig,
}

impl<'a> PathResolver<'a> {
    pub fn new(config: &'a SearchConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self) -> Result<ResolvedLocation, Error> {
        let config = self.config;
        match (&config.include_override, &config.library_override) {
            (Some(include), Some(library)) => self.resolve_override(include, library),
            (Some(_), None) => Err(partial_override(INCLUDE_OVERRIDE_VAR, LIBRARY_OVERRIDE_VAR)),
            (None, Some(_)) => Err(partial_override(LIBRARY_OVERRIDE_VAR, INCLUDE_OVERRIDE_VAR)),
            (None, None) => self.search(),
        }
    }

    fn resolve_override(
        &self,
        include: &Override,
        library: &Override,
    ) -> Result<ResolvedLocation, Error> {
        let (include_dir, header) = validate_override(include, &self.config.header_file)?;
        let (_, library) = validate_override(library, &self.config.library_file)?;
        tracing::info!(
            header = %header.display(),
            library = %library.display(),
            "using yogrt override paths"
        );
        Ok(ResolvedLocation {
            include_dir,
            header,
            library,
            from_override: true,
            library_fallbacks: Vec::new(),
        })
    }

    fn search(&self) -> Result<ResolvedLocation, Error> {
        let config = self.config;
        let include_dirs = candidate_dirs(&[
            &config.env_include_dirs,
            &config.standard_include_dirs,
            &config.compiler.include_dirs,
        ]);
        let library_dirs = candidate_dirs(&[
            &config.env_library_dirs,
            &config.standard_library_dirs,
            &config.compiler.library_dirs,
        ]);

        let mut tried = Vec::new();
        let header = first_readable(&include_dirs, &config.header_file, &mut tried);
        let mut libraries = all_readable(&library_dirs, &config.library_file, &mut tried);
        let library = (!libraries.is_empty()).then(|| libraries.remove(0));

        match (header, library) {
            (Some((include_dir, header)), Some(library)) => {
                tracing::info!(
                    header = %header.display(),
                    library = %library.display(),
                    fallbacks = libraries.len(),
                    "resolved yogrt location"
                );
                Ok(ResolvedLocation {
                    include_dir,
                    header,
                    library,
                    from_override: false,
                    library_fallbacks: libraries,
                })
            }
            (header, library) => {
                let mut missing = Vec::new();
                if header.is_none() {
                    missing.push(config.header_file.as_str());
                }
                if library.is_none() {
                    missing.push(config.library_file.as_str());
                }
                Err(Error::new(ErrorKind::DiscoveryFailed)
                    .with_message(format!("could not find {}", missing.join(" or ")))
                    .with_hint(format!(
                        "Set {INCLUDE_OVERRIDE_VAR} and {LIBRARY_OVERRIDE_VAR} to the libyogrt install."
                    ))
                    .with_tried(tried))
            }
        }
    }
}

fn partial_override(set: &str, unset: &str) -> Error {
    Error::new(ErrorKind::InvalidOverride)
        .with_message(format!("{set} is set but {unset} is not"))
        .with_hint(format!("Set both {set} and {unset}, or neither."))
}

fn validate_override(ov: &Override, file: &str) -> Result<(PathBuf, PathBuf), Error> {
    let mut tried = Vec::new();
    for dir in &ov.dirs {
        let candidate = dir.join(file);
        tried.push(candidate.clone());
        if dir.is_dir() && is_readable_file(&candidate) {
            return Ok((dir.clone(), candidate));
        }
        tracing::debug!(var = ov.var, dir = %dir.display(), "override dir rejected");
    }
    let mut err = Error::new(ErrorKind::InvalidOverride)
        .with_message(format!("{} does not name a directory containing {file}", ov.var))
        .with_tried(tried);
    if let Some(first) = ov.dirs.first() {
        err = err.with_path(first.clone());
    }
    Err(err)
}

/// Canonicalized, deduplicated directories in tier order; nonexistent ones are dropped.
fn candidate_dirs(tiers: &[&Vec<PathBuf>]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in tiers.iter().flat_map(|tier| tier.iter()) {
        let Ok(canonical) = dir.canonicalize() else {
            continue;
        };
        if !dirs.contains(&canonical) {
            dirs.push(canonical);
        }
    }
    dirs
}

fn first_readable(
    dirs: &[PathBuf],
    file: &str,
    tried: &mut Vec<PathBuf>,
) -> Option<(PathBuf, PathBuf)> {
    for dir in dirs {
        let candidate = dir.join(file);
        tracing::debug!(candidate = %candidate.display(), "probing");
        tried.push(candidate.clone());
        if is_readable_file(&candidate) {
            return Some((dir.clone(), candidate));
        }
    }
    None
}

fn all_readable(dirs: &[PathBuf], file: &str, tried: &mut Vec<PathBuf>) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        let candidate = dir.join(file);
        tracing::debug!(candidate = %candidate.display(), "probing");
        tried.push(candidate.clone());
        if is_readable_file(&candidate) {
            found.push(candidate);
        }
    }
    found
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}
