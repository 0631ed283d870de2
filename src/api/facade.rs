//! Purpose: The typed query surface over libyogrt.
//! Exports: `Yogrt`, `Backend`, `Opened`, `SystemBackend`, `global`.
//! Role: Runs discover -> load -> bind lazily, once, and translates native results.
//! Invariants: Initialization runs at most once per `Yogrt`, even under concurrent first use.
//! Invariants: A failed initialization is terminal; every later call returns the same error.
//! Invariants: Native-call failures are never cached; each call re-queries the library.
//! Invariants: Calls into native code are serialized behind one process-wide mutex, shared by
//! every `Yogrt`, since separate facades can hold the same loaded library.
#![allow(clippy::result_large_err)]

use std::os::raw::c_int;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use super::types::{InitState, JobStatus, PollIntervals, Remaining};
use crate::core::bind::{BoundSymbols, Capabilities, SymbolBinder};
use crate::core::config::SearchConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::header::HeaderDecls;
use crate::core::loader::{LibraryLoader, NativeLibrary};
use crate::core::resolve::{PathResolver, ResolvedLocation};

pub type ApiResult<T> = Result<T, Error>;

const MAX_DEBUG_LEVEL: u8 = 3;

/// What a backend hands the binder: a library plus what is known about where it came from.
pub struct Opened {
    pub library: Arc<dyn NativeLibrary>,
    pub location: Option<ResolvedLocation>,
    pub header: Option<HeaderDecls>,
}

/// Produces a loaded library; the facade calls `open` at most once.
pub trait Backend: Send + Sync {
    fn open(&self) -> ApiResult<Opened>;
}

/// Resolve on the real filesystem and load through the process-wide loader.
#[derive(Clone, Debug, Default)]
pub struct SystemBackend {
    config: Option<SearchConfig>,
}

impl SystemBackend {
    /// Uses the process-wide environment snapshot, so the compiler is probed at most once.
    pub fn from_env() -> Self {
        Self { config: None }
    }

    pub fn with_config(config: SearchConfig) -> Self {
        Self {
            config: Some(config),
        }
    }
}

impl Backend for SystemBackend {
    fn open(&self) -> ApiResult<Opened> {
        let config = match &self.config {
            Some(config) => config,
            None => SearchConfig::shared(),
        };
        let mut location = PathResolver::new(config).resolve()?;
        let header = HeaderDecls::read(&location.header).map_err(|err| {
            Error::new(ErrorKind::DiscoveryFailed)
                .with_message("resolved header could not be read")
                .with_path(&location.header)
                .with_source(err)
        })?;
        let library = LibraryLoader::global().load(&location)?;
        location.library = library.path().to_path_buf();
        Ok(Opened {
            library,
            location: Some(location),
            header: Some(header),
        })
    }
}

struct Ready {
    symbols: BoundSymbols,
    location: Option<ResolvedLocation>,
}

static NATIVE_CALLS: Mutex<()> = Mutex::new(());

/// One view of libyogrt. Each instance discovers, loads, and binds on its own first use;
/// [`global`] is the shared instance.
pub struct Yogrt {
    backend: Box<dyn Backend>,
    state: OnceLock<Result<Ready, Error>>,
}

impl Default for Yogrt {
    fn default() -> Self {
        Self::new()
    }
}

impl Yogrt {
    /// A separate instance over the shared environment snapshot; binding still happens per
    /// instance on first use, while the library handle itself is shared.
    pub fn new() -> Self {
        Self::with_backend(SystemBackend::from_env())
    }

    pub fn with_config(config: SearchConfig) -> Self {
        Self::with_backend(SystemBackend::with_config(config))
    }

    pub fn with_backend(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            state: OnceLock::new(),
        }
    }

    /// Current lifecycle state; never triggers initialization.
    pub fn state(&self) -> InitState {
        match self.state.get() {
            None => InitState::Uninitialized,
            Some(Ok(_)) => InitState::Ready,
            Some(Err(err)) => InitState::Unavailable(err.clone()),
        }
    }

    fn ready(&self) -> ApiResult<&Ready> {
        self.state
            .get_or_init(|| self.initialize())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn initialize(&self) -> Result<Ready, Error> {
        let result = self.backend.open().and_then(|opened| {
            let symbols = SymbolBinder::new(opened.header.as_ref()).bind(opened.library)?;
            Ok(Ready {
                symbols,
                location: opened.location,
            })
        });
        if let Err(err) = &result {
            tracing::warn!(error = %err, "yogrt unavailable");
        }
        result
    }

    fn call<T>(&self, f: impl FnOnce(&BoundSymbols) -> T) -> ApiResult<T> {
        let ready = self.ready()?;
        let _guard = NATIVE_CALLS.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&ready.symbols))
    }

    pub fn capabilities(&self) -> ApiResult<Capabilities> {
        Ok(self.ready()?.symbols.capabilities())
    }

    /// Where the library was found; `None` for backends that do not resolve paths.
    pub fn location(&self) -> ApiResult<Option<ResolvedLocation>> {
        Ok(self.ready()?.location.clone())
    }

    pub fn get_remaining(&self) -> ApiResult<Remaining> {
        let raw = self.call(|symbols| unsafe { (symbols.remaining)() })?;
        remaining_from_native(raw)
    }

    pub fn get_status(&self) -> ApiResult<JobStatus> {
        let raw = self.call(|symbols| symbols.status.map(|status| unsafe { status() }))?;
        let raw = raw.ok_or_else(|| unsupported("yogrt_get_status"))?;
        if raw < 0 {
            return Err(native_failed("yogrt_get_status", raw));
        }
        Ok(JobStatus::from_code(raw))
    }

    /// Suggested wait before the next `get_remaining`, from libyogrt's interval settings.
    pub fn get_poll_interval(&self) -> ApiResult<Duration> {
        let (intervals, remaining) = self.call(|symbols| {
            symbols.intervals.map(|fns| {
                let intervals = unsafe {
                    (
                        (fns.get_interval1)(),
                        (fns.get_interval2)(),
                        (fns.get_interval2_start)(),
                    )
                };
                (intervals, unsafe { (symbols.remaining)() })
            })
        })?
        .ok_or_else(|| unsupported("yogrt_get_interval1"))?;
        let intervals = intervals_from_native(intervals)?;
        let remaining = remaining_from_native(remaining)?;
        Ok(intervals.suggested(remaining))
    }

    pub fn intervals(&self) -> ApiResult<PollIntervals> {
        let raw = self
            .call(|symbols| {
                symbols.intervals.map(|fns| unsafe {
                    (
                        (fns.get_interval1)(),
                        (fns.get_interval2)(),
                        (fns.get_interval2_start)(),
                    )
                })
            })?
            .ok_or_else(|| unsupported("yogrt_get_interval1"))?;
        intervals_from_native(raw)
    }

    pub fn set_interval1(&self, interval: Duration) -> ApiResult<()> {
        let seconds = to_native_seconds(interval)?;
        self.call(|symbols| symbols.intervals.map(|fns| unsafe { (fns.set_interval1)(seconds) }))?
            .ok_or_else(|| unsupported("yogrt_set_interval1"))
    }

    pub fn set_interval2(&self, interval: Duration) -> ApiResult<()> {
        let seconds = to_native_seconds(interval)?;
        self.call(|symbols| symbols.intervals.map(|fns| unsafe { (fns.set_interval2)(seconds) }))?
            .ok_or_else(|| unsupported("yogrt_set_interval2"))
    }

    pub fn set_interval2_start(&self, threshold: Duration) -> ApiResult<()> {
        let seconds = to_native_seconds(threshold)?;
        self.call(|symbols| {
            symbols
                .intervals
                .map(|fns| unsafe { (fns.set_interval2_start)(seconds) })
        })?
        .ok_or_else(|| unsupported("yogrt_set_interval2_start"))
    }

    /// Overwrite libyogrt's cached remaining time.
    pub fn set_remaining(&self, remaining: Duration) -> ApiResult<()> {
        let seconds = to_native_seconds(remaining)?;
        self.call(|symbols| symbols.set_remaining.map(|set| unsafe { set(seconds) }))?
            .ok_or_else(|| unsupported("yogrt_set_remaining"))
    }

    pub fn debug_level(&self) -> ApiResult<u8> {
        let raw = self
            .call(|symbols| symbols.debug.map(|fns| unsafe { (fns.get)() }))?
            .ok_or_else(|| unsupported("yogrt_get_debug"))?;
        u8::try_from(raw).map_err(|_| native_failed("yogrt_get_debug", raw))
    }

    pub fn set_debug_level(&self, level: u8) -> ApiResult<()> {
        if level > MAX_DEBUG_LEVEL {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("debug level {level} is above {MAX_DEBUG_LEVEL}")));
        }
        self.call(|symbols| symbols.debug.map(|fns| unsafe { (fns.set)(c_int::from(level)) }))?
            .ok_or_else(|| unsupported("yogrt_set_debug"))
    }

    pub fn init(&self) -> ApiResult<()> {
        self.call(|symbols| symbols.lifecycle.map(|fns| unsafe { (fns.init)() }))?
            .ok_or_else(|| unsupported("yogrt_init"))
    }

    pub fn fini(&self) -> ApiResult<()> {
        self.call(|symbols| symbols.lifecycle.map(|fns| unsafe { (fns.fini)() }))?
            .ok_or_else(|| unsupported("yogrt_fini"))
    }
}

static GLOBAL: OnceLock<Yogrt> = OnceLock::new();

/// Process-wide facade configured from the environment on first use.
pub fn global() -> &'static Yogrt {
    GLOBAL.get_or_init(Yogrt::new)
}

fn remaining_from_native(raw: c_int) -> ApiResult<Remaining> {
    Remaining::from_native(raw).ok_or_else(|| native_failed("yogrt_remaining", raw))
}

fn intervals_from_native(raw: (c_int, c_int, c_int)) -> ApiResult<PollIntervals> {
    let (interval1, interval2, interval2_start) = raw;
    let seconds = |name: &str, value: c_int| {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| native_failed(name, value))
    };
    Ok(PollIntervals {
        interval1: seconds("yogrt_get_interval1", interval1)?,
        interval2: seconds("yogrt_get_interval2", interval2)?,
        interval2_start: seconds("yogrt_get_interval2_start", interval2_start)?,
    })
}

fn to_native_seconds(duration: Duration) -> ApiResult<c_int> {
    c_int::try_from(duration.as_secs()).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message(format!(
            "{}s does not fit in a native int",
            duration.as_secs()
        ))
    })
}

fn unsupported(symbol: &str) -> Error {
    Error::new(ErrorKind::Unsupported)
        .with_message(format!("native library does not export {symbol}"))
}

fn native_failed(symbol: &str, value: c_int) -> Error {
    Error::new(ErrorKind::NativeCallFailed)
        .with_message(format!("{symbol} returned {value}"))
        .with_hint("The resource manager may be unreachable, or this is not a batch job.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::ffi::c_void;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    static INTERVAL1: AtomicI32 = AtomicI32::new(900);
    static DEBUG: AtomicI32 = AtomicI32::new(0);

    extern "C" fn remaining_hour() -> c_int {
        3600
    }
    extern "C" fn get_interval1() -> c_int {
        INTERVAL1.load(Ordering::SeqCst)
    }
    extern "C" fn get_interval2() -> c_int {
        60
    }
    extern "C" fn get_interval2_start() -> c_int {
        600
    }
    extern "C" fn set_interval1(value: c_int) {
        INTERVAL1.store(value, Ordering::SeqCst);
    }
    extern "C" fn set_noop(_value: c_int) {}
    extern "C" fn get_debug() -> c_int {
        DEBUG.load(Ordering::SeqCst)
    }
    extern "C" fn set_debug(value: c_int) {
        DEBUG.store(value, Ordering::SeqCst);
    }
    extern "C" fn status_weird() -> c_int {
        99
    }

    struct FakeLibrary(HashMap<&'static str, usize>);

    impl NativeLibrary for FakeLibrary {
        fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
            self.0
                .get(name)
                .and_then(|address| NonNull::new(*address as *mut c_void))
        }
    }

    struct FakeBackend {
        symbols: Vec<(&'static str, usize)>,
        opens: Arc<AtomicUsize>,
    }

    impl Backend for FakeBackend {
        fn open(&self) -> ApiResult<Opened> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Opened {
                library: Arc::new(FakeLibrary(self.symbols.iter().copied().collect())),
                location: None,
                header: None,
            })
        }
    }

    fn full_library() -> Vec<(&'static str, usize)> {
        vec![
            ("yogrt_remaining", remaining_hour as usize),
            ("yogrt_set_interval1", set_interval1 as usize),
            ("yogrt_set_interval2", set_noop as usize),
            ("yogrt_set_interval2_start", set_noop as usize),
            ("yogrt_get_interval1", get_interval1 as usize),
            ("yogrt_get_interval2", get_interval2 as usize),
            ("yogrt_get_interval2_start", get_interval2_start as usize),
            ("yogrt_set_debug", set_debug as usize),
            ("yogrt_get_debug", get_debug as usize),
            ("yogrt_get_status", status_weird as usize),
        ]
    }

    fn facade(symbols: Vec<(&'static str, usize)>) -> (Yogrt, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let yogrt = Yogrt::with_backend(FakeBackend {
            symbols,
            opens: Arc::clone(&opens),
        });
        (yogrt, opens)
    }

    #[test]
    fn state_moves_from_uninitialized_to_ready() {
        let (yogrt, opens) = facade(full_library());
        assert!(matches!(yogrt.state(), InitState::Uninitialized));
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        assert_eq!(
            yogrt.get_remaining().expect("remaining"),
            Remaining::Limited(Duration::from_secs(3600))
        );
        assert!(matches!(yogrt.state(), InitState::Ready));
        yogrt.get_remaining().expect("remaining again");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poll_interval_uses_first_phase_above_threshold() {
        let (yogrt, _) = facade(full_library());
        yogrt.set_interval1(Duration::from_secs(120)).expect("set");
        assert_eq!(
            yogrt.get_poll_interval().expect("interval"),
            Duration::from_secs(120)
        );
        let intervals = yogrt.intervals().expect("intervals");
        assert_eq!(intervals.interval2, Duration::from_secs(60));
        assert_eq!(intervals.interval2_start, Duration::from_secs(600));
    }

    #[test]
    fn debug_level_is_range_checked() {
        let (yogrt, _) = facade(full_library());
        yogrt.set_debug_level(2).expect("set debug");
        assert_eq!(yogrt.debug_level().expect("debug"), 2);
        let err = yogrt.set_debug_level(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn unknown_status_code_is_kept() {
        let (yogrt, _) = facade(full_library());
        assert_eq!(yogrt.get_status().expect("status"), JobStatus::Unrecognized(99));
    }

    #[test]
    fn missing_capabilities_are_unsupported() {
        let (yogrt, _) = facade(vec![("yogrt_remaining", remaining_hour as usize)]);
        for err in [
            yogrt.get_status().unwrap_err(),
            yogrt.get_poll_interval().unwrap_err(),
            yogrt.set_remaining(Duration::from_secs(5)).unwrap_err(),
            yogrt.init().unwrap_err(),
            yogrt.fini().unwrap_err(),
            yogrt.debug_level().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Unsupported);
        }
        assert_eq!(yogrt.capabilities().expect("caps"), Capabilities::default());
    }

    #[test]
    fn oversized_durations_are_rejected_before_native_calls() {
        let (yogrt, _) = facade(full_library());
        let err = yogrt
            .set_interval2(Duration::from_secs(u64::from(u32::MAX)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
