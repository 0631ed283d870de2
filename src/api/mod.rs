//! Purpose: Public Rust API for querying remaining batch-job time.
//! Exports: `Yogrt`, result types, errors, and process-global query functions.
//! Role: Stable surface; the same calls work whichever resource manager libyogrt wraps.
//! Invariants: Free functions share one process-wide `Yogrt` configured from the environment.
#![allow(clippy::result_large_err)]

mod facade;
mod types;

use std::time::Duration;

pub use crate::core::bind::{Capabilities, Capability};
pub use crate::core::config::SearchConfig;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, LoadFailure};
pub use crate::core::loader::NativeLibrary;
pub use crate::core::resolve::ResolvedLocation;
pub use facade::{ApiResult, Backend, Opened, SystemBackend, Yogrt, global};
pub use types::{InitState, JobStatus, NO_LIMIT_SENTINEL, PollIntervals, Remaining};

pub fn get_remaining() -> ApiResult<Remaining> {
    global().get_remaining()
}

pub fn get_status() -> ApiResult<JobStatus> {
    global().get_status()
}

pub fn get_poll_interval() -> ApiResult<Duration> {
    global().get_poll_interval()
}

pub fn state() -> InitState {
    global().state()
}
