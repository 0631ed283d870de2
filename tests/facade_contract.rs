//! Purpose: Contract tests for the query facade's init, caching, and translation rules.
//! Exports: Integration tests only.
//! Role: Exercise the public API with in-memory native libraries and counting backends.
//! Invariants: No test depends on a real libyogrt being installed.
use std::collections::HashMap;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use yogrt::api::{
    ApiResult, Backend, Error, ErrorKind, InitState, NativeLibrary, Opened, Remaining,
    SearchConfig, Yogrt,
};

static FLAKY_REMAINING: AtomicI32 = AtomicI32::new(-1);
static SLOW_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
static SLOW_MAX_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

extern "C" fn remaining_ten_minutes() -> c_int {
    600
}

extern "C" fn remaining_unlimited() -> c_int {
    c_int::MAX
}

extern "C" fn remaining_zero() -> c_int {
    0
}

extern "C" fn remaining_flaky() -> c_int {
    FLAKY_REMAINING.load(Ordering::SeqCst)
}

extern "C" fn remaining_slow() -> c_int {
    let now = SLOW_IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
    SLOW_MAX_IN_FLIGHT.fetch_max(now, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    SLOW_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    300
}

struct InMemoryLibrary(HashMap<&'static str, usize>);

impl NativeLibrary for InMemoryLibrary {
    fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
        self.0
            .get(name)
            .and_then(|address| NonNull::new(*address as *mut c_void))
    }
}

struct CountingBackend {
    opens: Arc<AtomicUsize>,
    delay: Duration,
    outcome: Result<Vec<(&'static str, usize)>, Error>,
}

impl CountingBackend {
    fn library(symbols: Vec<(&'static str, usize)>) -> (Self, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let backend = Self {
            opens: Arc::clone(&opens),
            delay: Duration::ZERO,
            outcome: Ok(symbols),
        };
        (backend, opens)
    }

    fn failing(err: Error) -> (Self, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let backend = Self {
            opens: Arc::clone(&opens),
            delay: Duration::ZERO,
            outcome: Err(err),
        };
        (backend, opens)
    }
}

impl Backend for CountingBackend {
    fn open(&self) -> ApiResult<Opened> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        let symbols = self.outcome.clone()?;
        Ok(Opened {
            library: Arc::new(InMemoryLibrary(symbols.into_iter().collect())),
            location: None,
            header: None,
        })
    }
}

/// Hands every facade the same library, like the process-wide loader does.
struct SharedBackend(Arc<InMemoryLibrary>);

impl Backend for SharedBackend {
    fn open(&self) -> ApiResult<Opened> {
        Ok(Opened {
            library: self.0.clone(),
            location: None,
            header: None,
        })
    }
}

#[test]
fn facades_sharing_a_library_never_overlap_native_calls() {
    let library = Arc::new(InMemoryLibrary(
        [("yogrt_remaining", remaining_slow as usize)].into_iter().collect(),
    ));
    let first = Yogrt::with_backend(SharedBackend(Arc::clone(&library)));
    let second = Yogrt::with_backend(SharedBackend(library));

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let yogrt = if i % 2 == 0 { &first } else { &second };
                scope.spawn(move || yogrt.get_remaining())
            })
            .collect();
        for handle in handles {
            let remaining = handle.join().expect("join").expect("remaining");
            assert_eq!(remaining, Remaining::Limited(Duration::from_secs(300)));
        }
    });

    assert_eq!(SLOW_MAX_IN_FLIGHT.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_first_use_opens_once() {
    let (mut backend, opens) =
        CountingBackend::library(vec![("yogrt_remaining", remaining_ten_minutes as usize)]);
    backend.delay = Duration::from_millis(50);
    let yogrt = Yogrt::with_backend(backend);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| yogrt.get_remaining()))
            .collect();
        for handle in handles {
            let remaining = handle.join().expect("join").expect("remaining");
            assert_eq!(remaining, Remaining::Limited(Duration::from_secs(600)));
        }
    });

    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_discovery_is_cached_verbatim() {
    let (backend, opens) = CountingBackend::failing(
        Error::new(ErrorKind::DiscoveryFailed)
            .with_message("could not find yogrt.h")
            .with_tried(vec![PathBuf::from("/usr/include/yogrt.h")]),
    );
    let yogrt = Yogrt::with_backend(backend);

    let first = yogrt.get_remaining().unwrap_err();
    for _ in 0..5 {
        let again = yogrt.get_remaining().unwrap_err();
        assert_eq!(again.kind(), first.kind());
        assert_eq!(again.message(), first.message());
        assert_eq!(again.tried(), first.tried());
    }
    let status_err = yogrt.get_status().unwrap_err();
    assert_eq!(status_err.kind(), ErrorKind::DiscoveryFailed);

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    match yogrt.state() {
        InitState::Unavailable(err) => assert_eq!(err.kind(), ErrorKind::DiscoveryFailed),
        other => panic!("unexpected state: {}", other.as_str()),
    }
}

#[test]
fn incomplete_binding_is_terminal() {
    let (backend, opens) = CountingBackend::library(vec![("yogrt_get_debug", 0x10)]);
    let yogrt = Yogrt::with_backend(backend);

    let err = yogrt.get_remaining().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingIncomplete);
    assert!(err.missing_symbols().contains(&"yogrt_remaining".to_string()));
    assert_eq!(yogrt.capabilities().unwrap_err().kind(), ErrorKind::BindingIncomplete);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn no_limit_is_distinct_from_zero() {
    let (unlimited, _) =
        CountingBackend::library(vec![("yogrt_remaining", remaining_unlimited as usize)]);
    let (expired, _) = CountingBackend::library(vec![("yogrt_remaining", remaining_zero as usize)]);

    let unlimited = Yogrt::with_backend(unlimited).get_remaining().expect("unlimited");
    let expired = Yogrt::with_backend(expired).get_remaining().expect("expired");

    assert_eq!(unlimited, Remaining::Unlimited);
    assert_eq!(expired, Remaining::Limited(Duration::ZERO));
    assert_ne!(unlimited, expired);
}

#[test]
fn native_failures_are_retried_not_cached() {
    let (backend, opens) =
        CountingBackend::library(vec![("yogrt_remaining", remaining_flaky as usize)]);
    let yogrt = Yogrt::with_backend(backend);

    FLAKY_REMAINING.store(-1, Ordering::SeqCst);
    let err = yogrt.get_remaining().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NativeCallFailed);
    assert!(matches!(yogrt.state(), InitState::Ready));

    FLAKY_REMAINING.store(45, Ordering::SeqCst);
    assert_eq!(
        yogrt.get_remaining().expect("remaining"),
        Remaining::Limited(Duration::from_secs(45))
    );
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn remaining_only_library_reports_unsupported_interval() {
    let (backend, _) =
        CountingBackend::library(vec![("yogrt_remaining", remaining_ten_minutes as usize)]);
    let yogrt = Yogrt::with_backend(backend);

    assert!(yogrt.get_remaining().is_ok());
    let err = yogrt.get_poll_interval().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn state_is_not_initialized_by_inspection() {
    let (backend, opens) =
        CountingBackend::library(vec![("yogrt_remaining", remaining_ten_minutes as usize)]);
    let yogrt = Yogrt::with_backend(backend);
    assert!(matches!(yogrt.state(), InitState::Uninitialized));
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}

#[test]
fn system_backend_without_install_is_discovery_failed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = SearchConfig::empty().with_standard_dirs(
        vec![temp.path().join("include")],
        vec![temp.path().join("lib")],
    );
    let yogrt = Yogrt::with_config(config);

    for _ in 0..3 {
        let err = yogrt.get_remaining().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DiscoveryFailed);
    }
}

#[test]
fn system_backend_rejects_unloadable_override() {
    let temp = tempfile::tempdir().expect("tempdir");
    let include = temp.path().join("include");
    let lib = temp.path().join("lib");
    std::fs::create_dir_all(&include).expect("mkdir");
    std::fs::create_dir_all(&lib).expect("mkdir");
    std::fs::write(include.join("yogrt.h"), "int yogrt_remaining(void);\n").expect("header");
    std::fs::write(
        lib.join(yogrt::core::config::library_file_name()),
        b"not an object file",
    )
    .expect("library");

    let config = SearchConfig::empty()
        .with_include_override(&include)
        .with_library_override(&lib);
    let yogrt = Yogrt::with_config(config);

    let err = yogrt.get_remaining().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadFailed);
    assert!(err.load_failure().is_some());
}
