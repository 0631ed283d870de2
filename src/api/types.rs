//! Purpose: Typed values returned by the query facade.
//! Exports: `Remaining`, `JobStatus`, `PollIntervals`, `InitState`.
//! Role: Replace raw libyogrt integers and sentinels with explicit variants.
//! Invariants: "No limit" is its own variant and never a large or zero duration.
use std::os::raw::c_int;
use std::time::Duration;

use crate::core::error::Error;

/// Native value libyogrt reports when the job has no wall-clock limit.
pub const NO_LIMIT_SENTINEL: c_int = c_int::MAX;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Remaining {
    Limited(Duration),
    Unlimited,
}

impl Remaining {
    /// `None` for negative values, which libyogrt uses for "unknown".
    pub fn from_native(seconds: c_int) -> Option<Self> {
        match seconds {
            NO_LIMIT_SENTINEL => Some(Remaining::Unlimited),
            s if s < 0 => None,
            s => Some(Remaining::Limited(Duration::from_secs(s as u64))),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Remaining::Unlimited)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Remaining::Limited(duration) => Some(*duration),
            Remaining::Unlimited => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    NoJob,
    Pending,
    Running,
    Suspended,
    Completing,
    Unrecognized(i32),
}

impl JobStatus {
    pub fn from_code(code: c_int) -> Self {
        match code {
            0 => JobStatus::NoJob,
            1 => JobStatus::Pending,
            2 => JobStatus::Running,
            3 => JobStatus::Suspended,
            4 => JobStatus::Completing,
            other => JobStatus::Unrecognized(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NoJob => "no_job",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Suspended => "suspended",
            JobStatus::Completing => "completing",
            JobStatus::Unrecognized(_) => "unrecognized",
        }
    }
}

/// libyogrt's two-phase re-query schedule.
///
/// `interval1` applies while more than `interval2_start` remains, `interval2` after that.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollIntervals {
    pub interval1: Duration,
    pub interval2: Duration,
    pub interval2_start: Duration,
}

impl PollIntervals {
    pub fn suggested(&self, remaining: Remaining) -> Duration {
        match remaining {
            Remaining::Unlimited => self.interval1,
            Remaining::Limited(left) if left > self.interval2_start => self.interval1,
            Remaining::Limited(_) => self.interval2,
        }
    }
}

#[derive(Clone, Debug)]
pub enum InitState {
    Uninitialized,
    Ready,
    Unavailable(Error),
}

impl InitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitState::Uninitialized => "uninitialized",
            InitState::Ready => "ready",
            InitState::Unavailable(_) => "unavailable",
        }
    }
}
