//! Purpose: Typed access to libyogrt ("Your One Get Remaining Time") from Rust.
//! Exports: `api` (query facade and types), `core` (discovery, loading, binding), `notice`.
//! Role: Library behind the `yogrt` CLI; lets long jobs checkpoint before the scheduler kills them.
//! Invariants: libyogrt is located and loaded at runtime, never linked at build time.
//! Invariants: Prefer `api`; `core` is public for embedders that need custom discovery.
pub mod api;
pub mod core;
pub mod notice;

pub use api::{get_poll_interval, get_remaining, get_status};
