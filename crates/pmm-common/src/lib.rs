//! Shared building blocks for the PMM integration harness
//!
//! - [`logging`]: tracing subscriber setup with the harness's debug switches
//! - [`polling`]: fixed-interval polling bounded by a deadline
//! - [`remote`]: shell command rendering for the remote compute instance
//! - [`types`]: connection descriptors shared with the PMM client

pub mod logging;
pub mod polling;
pub mod remote;
pub mod types;

pub use polling::{poll_until, wait_ready, PollError, PollSettings, ProbeOutcome};
pub use remote::package_manager::PackageManager;
pub use types::DatabaseConnection;
