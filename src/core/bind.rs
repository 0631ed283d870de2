//! Purpose: Turn exported libyogrt symbols into typed function pointers, once.
//! Exports: `SymbolBinder`, `BoundSymbols`, `Capability`, `Capabilities`, `SYMBOLS`.
//! Role: Third stage of the discover -> load -> bind chain.
//! Invariants: Binding is atomic; any missing required symbol fails the whole table.
//! Invariants: Optional capabilities are bound as complete groups or not at all.
//! Invariants: Bound tables keep their library alive, so pointers never dangle.
use std::collections::HashMap;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr::NonNull;
use std::sync::Arc;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::header::HeaderDecls;
use crate::core::loader::NativeLibrary;

type IntGetter = unsafe extern "C" fn() -> c_int;
type IntSetter = unsafe extern "C" fn(c_int);
type VoidFn = unsafe extern "C" fn();

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    Remaining,
    Override,
    Intervals,
    Debug,
    Lifecycle,
    Status,
}

impl Capability {
    pub fn is_required(self) -> bool {
        matches!(self, Capability::Remaining)
    }

    fn all() -> [Capability; 6] {
        [
            Capability::Remaining,
            Capability::Override,
            Capability::Intervals,
            Capability::Debug,
            Capability::Lifecycle,
            Capability::Status,
        ]
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Getter,
    Setter,
    Action,
}

impl Shape {
    fn ret(self) -> &'static str {
        match self {
            Shape::Getter => "int",
            Shape::Setter | Shape::Action => "void",
        }
    }

    fn params(self) -> &'static [&'static str] {
        match self {
            Shape::Setter => &["int"],
            Shape::Getter | Shape::Action => &[],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SymbolEntry {
    pub name: &'static str,
    pub capability: Capability,
    shape: Shape,
}

const fn entry(name: &'static str, capability: Capability, shape: Shape) -> SymbolEntry {
    SymbolEntry {
        name,
        capability,
        shape,
    }
}

/// Every libyogrt entry point this crate knows how to call.
pub const SYMBOLS: &[SymbolEntry] = &[
    entry("yogrt_remaining", Capability::Remaining, Shape::Getter),
    entry("yogrt_set_remaining", Capability::Override, Shape::Setter),
    entry("yogrt_set_interval1", Capability::Intervals, Shape::Setter),
    entry("yogrt_set_interval2", Capability::Intervals, Shape::Setter),
    entry("yogrt_set_interval2_start", Capability::Intervals, Shape::Setter),
    entry("yogrt_get_interval1", Capability::Intervals, Shape::Getter),
    entry("yogrt_get_interval2", Capability::Intervals, Shape::Getter),
    entry("yogrt_get_interval2_start", Capability::Intervals, Shape::Getter),
    entry("yogrt_set_debug", Capability::Debug, Shape::Setter),
    entry("yogrt_get_debug", Capability::Debug, Shape::Getter),
    entry("yogrt_init", Capability::Lifecycle, Shape::Action),
    entry("yogrt_fini", Capability::Lifecycle, Shape::Action),
    entry("yogrt_get_status", Capability::Status, Shape::Getter),
];

/// Which optional groups the bound library provides.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Capabilities {
    pub set_remaining: bool,
    pub intervals: bool,
    pub debug: bool,
    pub lifecycle: bool,
    pub status: bool,
}

#[derive(Clone, Copy)]
pub(crate) struct IntervalFns {
    pub(crate) set_interval1: IntSetter,
    pub(crate) set_interval2: IntSetter,
    pub(crate) set_interval2_start: IntSetter,
    pub(crate) get_interval1: IntGetter,
    pub(crate) get_interval2: IntGetter,
    pub(crate) get_interval2_start: IntGetter,
}

#[derive(Clone, Copy)]
pub(crate) struct DebugFns {
    pub(crate) set: IntSetter,
    pub(crate) get: IntGetter,
}

#[derive(Clone, Copy)]
pub(crate) struct LifecycleFns {
    pub(crate) init: VoidFn,
    pub(crate) fini: VoidFn,
}

pub struct BoundSymbols {
    pub(crate) remaining: IntGetter,
    pub(crate) set_remaining: Option<IntSetter>,
    pub(crate) intervals: Option<IntervalFns>,
    pub(crate) debug: Option<DebugFns>,
    pub(crate) lifecycle: Option<LifecycleFns>,
    pub(crate) status: Option<IntGetter>,
    _library: Arc<dyn NativeLibrary>,
}

impl BoundSymbols {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            set_remaining: self.set_remaining.is_some(),
            intervals: self.intervals.is_some(),
            debug: self.debug.is_some(),
            lifecycle: self.lifecycle.is_some(),
            status: self.status.is_some(),
        }
    }
}

impl std::fmt::Debug for BoundSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSymbols")
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

pub struct SymbolBinder<'a> {
    header: Option<&'a HeaderDecls>,
}

impl<'a> SymbolBinder<'a> {
    /// With a header, every symbol must also be declared there with the expected prototype.
    pub fn new(header: Option<&'a HeaderDecls>) -> Self {
        Self { header }
    }

    pub fn bind(&self, library: Arc<dyn NativeLibrary>) -> Result<BoundSymbols, Error> {
        let mut found: HashMap<&'static str, NonNull<c_void>> = HashMap::new();
        let mut mismatched = Vec::new();

        for symbol in SYMBOLS {
            let Some(address) = library.symbol_address(symbol.name) else {
                continue;
            };
            if let Some(header) = self.header {
                match header.get(symbol.name) {
                    Some(proto) if proto.matches(symbol.shape.ret(), symbol.shape.params()) => {}
                    Some(proto) => {
                        let expected = if symbol.shape.params().is_empty() {
                            "void".to_string()
                        } else {
                            symbol.shape.params().join(", ")
                        };
                        mismatched.push((
                            symbol.name,
                            format!(
                                "{} declared as {proto}, expected {}({expected})",
                                symbol.name,
                                symbol.shape.ret()
                            ),
                        ));
                        continue;
                    }
                    None => {
                        tracing::debug!(symbol = symbol.name, "exported but not declared in header");
                        continue;
                    }
                }
            }
            found.insert(symbol.name, address);
        }

        let mut missing = Vec::new();
        for capability in Capability::all() {
            let group: Vec<&SymbolEntry> = SYMBOLS
                .iter()
                .filter(|symbol| symbol.capability == capability)
                .collect();
            let present = group.iter().filter(|s| found.contains_key(s.name)).count();
            if present == group.len() || (present == 0 && !capability.is_required()) {
                continue;
            }
            if !capability.is_required() {
                tracing::warn!(?capability, present, total = group.len(), "partial capability");
            }
            missing.extend(
                group
                    .iter()
                    .filter(|s| !found.contains_key(s.name))
                    .map(|s| s.name.to_string()),
            );
        }

        if !missing.is_empty() || !mismatched.is_empty() {
            let mut message = String::from("native library does not provide the full yogrt API");
            if !mismatched.is_empty() {
                let details: Vec<&str> = mismatched.iter().map(|(_, d)| d.as_str()).collect();
                message.push_str(": ");
                message.push_str(&details.join("; "));
            }
            for (name, _) in &mismatched {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
            return Err(Error::new(ErrorKind::BindingIncomplete)
                .with_message(message)
                .with_missing(missing));
        }

        let getter = |name: &str| found.get(name).map(|address| as_getter(*address));
        let setter = |name: &str| found.get(name).map(|address| as_setter(*address));
        let action = |name: &str| found.get(name).map(|address| as_action(*address));

        let remaining = getter("yogrt_remaining").ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("remaining symbol vanished after check")
        })?;

        let intervals = match (
            setter("yogrt_set_interval1"),
            setter("yogrt_set_interval2"),
            setter("yogrt_set_interval2_start"),
            getter("yogrt_get_interval1"),
            getter("yogrt_get_interval2"),
            getter("yogrt_get_interval2_start"),
        ) {
            (Some(s1), Some(s2), Some(s2s), Some(g1), Some(g2), Some(g2s)) => Some(IntervalFns {
                set_interval1: s1,
                set_interval2: s2,
                set_interval2_start: s2s,
                get_interval1: g1,
                get_interval2: g2,
                get_interval2_start: g2s,
            }),
            _ => None,
        };
        let debug = match (setter("yogrt_set_debug"), getter("yogrt_get_debug")) {
            (Some(set), Some(get)) => Some(DebugFns { set, get }),
            _ => None,
        };
        let lifecycle = match (action("yogrt_init"), action("yogrt_fini")) {
            (Some(init), Some(fini)) => Some(LifecycleFns { init, fini }),
            _ => None,
        };

        let symbols = BoundSymbols {
            remaining,
            set_remaining: setter("yogrt_set_remaining"),
            intervals,
            debug,
            lifecycle,
            status: getter("yogrt_get_status"),
            _library: library,
        };
        tracing::info!(capabilities = ?symbols.capabilities(), "bound yogrt symbols");
        Ok(symbols)
    }
}

// SAFETY (all three): the address came from the symbol table of a loaded library and the
// prototype was checked against the header when one was available.
fn as_getter(address: NonNull<c_void>) -> IntGetter {
    unsafe { std::mem::transmute::<*mut c_void, IntGetter>(address.as_ptr()) }
}

fn as_setter(address: NonNull<c_void>) -> IntSetter {
    unsafe { std::mem::transmute::<*mut c_void, IntSetter>(address.as_ptr()) }
}

fn as_action(address: NonNull<c_void>) -> VoidFn {
    unsafe { std::mem::transmute::<*mut c_void, VoidFn>(address.as_ptr()) }
}
