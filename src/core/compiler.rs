//! Purpose: Ask the host toolchain where it looks for headers and libraries.
//! Exports: `CompilerPaths`, `ProbeError`, `probe_search_paths`, output parsers.
//! Role: Third search tier for the path resolver; strictly best-effort.
//! Invariants: Every child process is bounded by a timeout and killed when it expires.
//! Invariants: Failures never propagate; they are logged and yield empty path lists.
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const INCLUDE_START: &str = "#include <...> search starts here:";
const INCLUDE_END: &str = "End of search list.";
const LIBRARY_PATH_PREFIX: &str = "LIBRARY_PATH=";
const LDCONFIG_CANDIDATES: &[&str] = &["ldconfig", "/sbin/ldconfig", "/usr/sbin/ldconfig"];

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompilerPaths {
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
}

#[derive(Debug)]
pub enum ProbeError {
    NotFound,
    Spawn(io::Error),
    TimedOut(Duration),
    Failed(ExitStatus),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::NotFound => write!(f, "no compiler found"),
            ProbeError::Spawn(err) => write!(f, "spawn failed: {err}"),
            ProbeError::TimedOut(limit) => write!(f, "timed out after {}ms", limit.as_millis()),
            ProbeError::Failed(status) => write!(f, "exited with {status}"),
        }
    }
}

/// Run every introspection source available on this host.
pub fn probe_search_paths(timeout: Duration) -> CompilerPaths {
    let mut paths = CompilerPaths::default();

    match preprocessor_output(timeout) {
        Ok(output) => {
            paths.include_dirs = parse_include_dirs(&output);
            paths.library_dirs = parse_library_path_lines(&output);
        }
        Err(err) => tracing::warn!(error = %err, "compiler introspection unavailable"),
    }

    match ldconfig_output(timeout) {
        Ok(output) => {
            for dir in parse_ldconfig(&output, &crate::core::config::library_file_name()) {
                if !paths.library_dirs.contains(&dir) {
                    paths.library_dirs.push(dir);
                }
            }
        }
        Err(err) => tracing::debug!(error = %err, "ldconfig cache unavailable"),
    }

    tracing::debug!(
        include_dirs = paths.include_dirs.len(),
        library_dirs = paths.library_dirs.len(),
        "compiler search paths probed"
    );
    paths
}

fn preprocessor_output(timeout: Duration) -> Result<String, ProbeError> {
    let compiler = determine_compiler(|name| std::env::var_os(name)).ok_or(ProbeError::NotFound)?;
    let cpp = run_bounded(
        Command::new(&compiler).arg("-print-prog-name=cpp"),
        timeout,
    )?;
    let cpp = cpp.trim();
    if cpp.is_empty() {
        return Err(ProbeError::NotFound);
    }
    run_bounded(Command::new(cpp).arg("-v"), timeout)
}

fn ldconfig_output(timeout: Duration) -> Result<String, ProbeError> {
    let mut last = ProbeError::NotFound;
    for candidate in LDCONFIG_CANDIDATES {
        match run_bounded(Command::new(candidate).arg("-p"), timeout) {
            Ok(output) => return Ok(output),
            Err(ProbeError::Spawn(err)) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => last = err,
        }
    }
    Err(last)
}

/// `$CC` if set, otherwise the first of `cc`, `gcc`, `clang` found on `PATH`.
pub fn determine_compiler<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(cc) = lookup("CC").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(cc));
    }
    let search = lookup("PATH")?;
    ["cc", "gcc", "clang"]
        .iter()
        .find_map(|name| find_on_path(name, &search))
}

fn find_on_path(name: &str, search: &OsString) -> Option<PathBuf> {
    std::env::split_paths(search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run `command` with stdin closed, returning stdout followed by stderr.
pub fn run_bounded(command: &mut Command, timeout: Duration) -> Result<String, ProbeError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ProbeError::Spawn)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let start = Instant::now();
    let poll = Duration::from_millis(10).min(timeout.max(Duration::from_millis(1)));
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProbeError::TimedOut(timeout));
                }
                thread::sleep(poll);
            }
            Err(err) => return Err(ProbeError::Spawn(err)),
        }
    };

    let mut output = String::new();
    for reader in [stdout, stderr].into_iter().flatten() {
        if let Ok(text) = reader.join() {
            output.push_str(&text);
        }
    }

    if !status.success() {
        return Err(ProbeError::Failed(status));
    }
    Ok(output)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// Directories listed between the `#include <...>` markers of `cpp -v`.
pub fn parse_include_dirs(output: &str) -> Vec<PathBuf> {
    let lines: Vec<&str> = output.lines().collect();
    let Some(start) = lines.iter().position(|line| line.trim() == INCLUDE_START) else {
        return Vec::new();
    };
    let Some(end) = lines.iter().position(|line| line.trim() == INCLUDE_END) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    lines[start + 1..end]
        .iter()
        // clang marks framework dirs with a trailing annotation
        .map(|line| line.trim().trim_end_matches(" (framework directory)"))
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn parse_library_path_lines(output: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for line in output.lines() {
        let Some(value) = line.trim().strip_prefix(LIBRARY_PATH_PREFIX) else {
            continue;
        };
        for dir in std::env::split_paths(value) {
            if !dir.as_os_str().is_empty() && !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

/// Parent directories of cache entries named exactly `library_file`.
pub fn parse_ldconfig(output: &str, library_file: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        // the trailing space rules out versioned names like libyogrt.so.1
        if !line.starts_with(&format!("{library_file} ")) {
            continue;
        }
        let Some((_, target)) = line.split_once(" => ") else {
            continue;
        };
        if let Some(parent) = Path::new(target.trim()).parent() {
            let parent = parent.to_path_buf();
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
    }
    dirs
}
