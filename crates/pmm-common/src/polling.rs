//! Fixed-interval polling bounded by a deadline
//!
//! Every wait in the harness goes through [`poll_until`]: HTTP readiness of the PMM
//! server, SSM command invocations and backup jobs. The probe runs immediately, then
//! once per `interval` until it reports ready, asks to abort, or the deadline passes.
//! There is no backoff growth.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Deadline used when `started + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline and interval for one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Overall budget, measured from the first probe
    pub timeout: Duration,
    /// Fixed pause between probes
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_secs(timeout_secs: u64, interval_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T, E> {
    /// Terminal success, stop polling
    Ready(T),
    /// Not there yet, probe again after the interval
    Pending,
    /// Terminal failure, stop polling without further probes
    Abort(E),
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("{operation} did not complete within {timeout:?} ({attempts} attempts, {elapsed:?} elapsed)")]
    DeadlineExceeded {
        operation: String,
        timeout: Duration,
        elapsed: Duration,
        attempts: u32,
    },

    #[error("{0}")]
    Aborted(E),
}

impl<E> PollError<E> {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, PollError::DeadlineExceeded { .. })
    }

    /// Convert the abort payload, keeping deadline details intact
    pub fn map_aborted<F>(self, f: impl FnOnce(E) -> F) -> PollError<F> {
        match self {
            PollError::DeadlineExceeded {
                operation,
                timeout,
                elapsed,
                attempts,
            } => PollError::DeadlineExceeded {
                operation,
                timeout,
                elapsed,
                attempts,
            },
            PollError::Aborted(e) => PollError::Aborted(f(e)),
        }
    }
}

impl PollError<Infallible> {
    /// Widen an error from a loop whose probe cannot abort
    pub fn widen<E>(self) -> PollError<E> {
        self.map_aborted(|never| match never {})
    }
}

/// Run `probe` until it is ready, aborts, or `settings.timeout` elapses.
///
/// A probe is never started once the deadline has passed, and a probe still running at
/// the deadline is cut off and counted as pending.
pub async fn poll_until<T, E, F, Fut>(
    operation: &str,
    settings: PollSettings,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeOutcome<T, E>>,
{
    let started = Instant::now();
    let deadline = started
        .checked_add(settings.timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());

        match tokio::time::timeout(remaining, probe()).await {
            Ok(ProbeOutcome::Ready(value)) => {
                debug!(
                    operation,
                    attempts,
                    elapsed = ?started.elapsed(),
                    "Polling finished"
                );
                return Ok(value);
            }
            Ok(ProbeOutcome::Abort(e)) => {
                debug!(operation, attempts, "Polling aborted by probe");
                return Err(PollError::Aborted(e));
            }
            Ok(ProbeOutcome::Pending) => {}
            Err(_) => {
                debug!(operation, attempts, "Probe cut off at deadline");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = now - started;
            warn!(
                operation,
                attempts,
                ?elapsed,
                "Deadline exceeded while polling"
            );
            return Err(PollError::DeadlineExceeded {
                operation: operation.to_string(),
                timeout: settings.timeout,
                elapsed,
                attempts,
            });
        }

        tokio::time::sleep(settings.interval.min(deadline - now)).await;

        if Instant::now() >= deadline {
            let elapsed = started.elapsed();
            warn!(
                operation,
                attempts,
                ?elapsed,
                "Deadline exceeded while polling"
            );
            return Err(PollError::DeadlineExceeded {
                operation: operation.to_string(),
                timeout: settings.timeout,
                elapsed,
                attempts,
            });
        }
    }
}

/// Wait until a boolean health probe answers `true`.
///
/// Probe errors mean "not ready yet"; only the deadline ends the wait unsuccessfully.
pub async fn wait_ready<E, F, Fut>(
    operation: &str,
    settings: PollSettings,
    mut probe: F,
) -> Result<(), PollError<Infallible>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    poll_until(operation, settings, || {
        let check = probe();
        async move {
            match check.await {
                Ok(true) => ProbeOutcome::Ready(()),
                Ok(false) => ProbeOutcome::Pending,
                Err(e) => {
                    debug!(error = %e, "Probe failed, treating as not ready");
                    ProbeOutcome::Pending
                }
            }
        }
    })
    .await
}
