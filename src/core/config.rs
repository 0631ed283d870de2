//! Purpose: Immutable snapshot of every input the path resolver consults.
//! Exports: `SearchConfig`, `Override`, file-name helpers, env var names.
//! Role: The only place the crate reads discovery-related environment variables.
//! Invariants: Built once, then only borrowed; nothing mutates it after resolution starts.
//! Invariants: Empty env values are treated as unset.
//! Invariants: `shared` probes the environment and compiler at most once per process.
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::compiler::{self, CompilerPaths};

pub const INCLUDE_OVERRIDE_VAR: &str = "YOGRT_INCLUDE_PATH";
pub const LIBRARY_OVERRIDE_VAR: &str = "YOGRT_LIBRARY_PATH";
pub const PROBE_TIMEOUT_VAR: &str = "YOGRT_PROBE_TIMEOUT_MS";

pub const HEADER_FILE: &str = "yogrt.h";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const STANDARD_INCLUDE_DIRS: &[&str] = &["/usr/local/include", "/usr/include"];
const STANDARD_LIBRARY_DIRS: &[&str] = &[
    "/usr/local/lib64",
    "/usr/local/lib",
    "/usr/lib64",
    "/usr/lib",
    "/lib64",
    "/lib",
];

/// `libyogrt.so` on Linux, `libyogrt.dylib` on macOS.
pub fn library_file_name() -> String {
    format!(
        "{}yogrt{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// An operator-supplied location for one of the two artifacts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Override {
    pub var: &'static str,
    pub dirs: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub include_override: Option<Override>,
    pub library_override: Option<Override>,
    pub env_include_dirs: Vec<PathBuf>,
    pub env_library_dirs: Vec<PathBuf>,
    pub standard_include_dirs: Vec<PathBuf>,
    pub standard_library_dirs: Vec<PathBuf>,
    pub compiler: CompilerPaths,
    pub header_file: String,
    pub library_file: String,
    pub probe_timeout: Duration,
}

impl SearchConfig {
    /// Snapshot of the process environment plus host compiler introspection.
    ///
    /// The compiler is only consulted when neither override is set; any override either
    /// wins outright or fails resolution, so the other tiers would never be read.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|name| std::env::var_os(name));
        if config.include_override.is_some() || config.library_override.is_some() {
            return config;
        }
        let compiler = compiler::probe_search_paths(config.probe_timeout);
        config.with_compiler_paths(compiler)
    }

    /// Process-wide snapshot from [`SearchConfig::from_env`], taken on first use.
    pub fn shared() -> &'static SearchConfig {
        static SHARED: OnceLock<SearchConfig> = OnceLock::new();
        SHARED.get_or_init(Self::from_env)
    }

    /// Build from an arbitrary variable source without running any external process.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let include_override = read(INCLUDE_OVERRIDE_VAR).map(|value| Override {
            var: INCLUDE_OVERRIDE_VAR,
            dirs: split_dirs(&value),
        });
        let library_override = read(LIBRARY_OVERRIDE_VAR).map(|value| Override {
            var: LIBRARY_OVERRIDE_VAR,
            dirs: split_dirs(&value),
        });

        let mut env_include_dirs = Vec::new();
        for name in ["CPATH", "C_INCLUDE_PATH"] {
            if let Some(value) = read(name) {
                env_include_dirs.extend(split_dirs(&value));
            }
        }
        let env_library_dirs = read("LIBRARY_PATH")
            .map(|value| split_dirs(&value))
            .unwrap_or_default();

        let probe_timeout = read(PROBE_TIMEOUT_VAR)
            .and_then(|value| value.to_str().and_then(|s| s.trim().parse::<u64>().ok()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT);

        Self {
            include_override,
            library_override,
            env_include_dirs,
            env_library_dirs,
            standard_include_dirs: STANDARD_INCLUDE_DIRS.iter().map(PathBuf::from).collect(),
            standard_library_dirs: STANDARD_LIBRARY_DIRS.iter().map(PathBuf::from).collect(),
            compiler: CompilerPaths::default(),
            header_file: HEADER_FILE.to_string(),
            library_file: library_file_name(),
            probe_timeout,
        }
    }

    /// A config with no overrides and no search directories at all.
    pub fn empty() -> Self {
        Self {
            include_override: None,
            library_override: None,
            env_include_dirs: Vec::new(),
            env_library_dirs: Vec::new(),
            standard_include_dirs: Vec::new(),
            standard_library_dirs: Vec::new(),
            compiler: CompilerPaths::default(),
            header_file: HEADER_FILE.to_string(),
            library_file: library_file_name(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn has_complete_override(&self) -> bool {
        self.include_override.is_some() && self.library_override.is_some()
    }

    pub fn with_include_override(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_override = Some(Override {
            var: INCLUDE_OVERRIDE_VAR,
            dirs: vec![dir.into()],
        });
        self
    }

    pub fn with_library_override(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_override = Some(Override {
            var: LIBRARY_OVERRIDE_VAR,
            dirs: vec![dir.into()],
        });
        self
    }

    pub fn with_standard_dirs(
        mut self,
        include_dirs: Vec<PathBuf>,
        library_dirs: Vec<PathBuf>,
    ) -> Self {
        self.standard_include_dirs = include_dirs;
        self.standard_library_dirs = library_dirs;
        self
    }

    pub fn with_compiler_paths(mut self, compiler: CompilerPaths) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

fn split_dirs(value: &OsString) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}
