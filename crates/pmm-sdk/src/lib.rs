//! Client for the PMM server HTTP API
//!
//! Covers the endpoints the integration harness needs: readiness, version,
//! service inventory, agent lookup and PostgreSQL service registration.

pub mod client;
pub mod error;
pub mod inventory;
pub mod types;

pub use client::{ClientBuilder, PmmClient, DEFAULT_TIMEOUT_SECS, DEFAULT_USERNAME};
pub use error::{ApiError, Result};
pub use inventory::{is_registered, select_agent, DATABASE_SERVICE_TYPES};
pub use types::*;
