//! Convergence polling against the provider's list endpoint.
//!
//! [`ConvergencePoller::converge`] lists the instances matching a selector,
//! reports the snapshot through the caller's tick callback, and evaluates the
//! caller's predicate. It keeps polling on a fixed interval until the
//! predicate holds, the deadline or attempt cap is reached, or the
//! cancellation token fires.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::{CloudGateway, Instance};

/// Default delay between list queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Default upper bound on a single convergence wait.
pub const DEFAULT_CONVERGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Instances returned by one poll tick.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConvergenceSnapshot {
    attempt: u32,
    instances: Vec<Instance>,
}

impl ConvergenceSnapshot {
    /// Wraps the instances observed on tick `attempt` (1-based).
    #[must_use]
    pub const fn new(attempt: u32, instances: Vec<Instance>) -> Self {
        Self {
            attempt,
            instances,
        }
    }

    /// Wraps a one-off listing that was not produced by a poll loop.
    #[must_use]
    pub const fn from_listing(instances: Vec<Instance>) -> Self {
        Self::new(0, instances)
    }

    /// Tick number that produced the snapshot; zero for one-off listings.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Observed instances in provider order.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Number of observed instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` when nothing matched the selector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of instances reporting the active status.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|instance| instance.status.is_active())
            .count()
    }

    /// Consumes the snapshot, returning the instances.
    #[must_use]
    pub fn into_instances(self) -> Vec<Instance> {
        self.instances
    }
}

/// Bounds and cadence of a convergence wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    interval: Duration,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_CONVERGE_TIMEOUT),
            max_attempts: None,
        }
    }
}

impl PollSettings {
    /// Creates settings with the given interval and the default timeout.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: Some(DEFAULT_CONVERGE_TIMEOUT),
            max_attempts: None,
        }
    }

    /// Sets the overall deadline; `None` polls until the predicate holds or
    /// the wait is cancelled.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the number of list queries.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay between ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Overall deadline, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attempt cap, if any.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Decides the state after a tick.
    ///
    /// A wait fails when the attempt cap is reached or when sleeping another
    /// interval would cross the deadline.
    #[must_use]
    pub fn next_state(&self, converged: bool, attempt: u32, elapsed: Duration) -> PollState {
        if converged {
            return PollState::Converged;
        }
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return PollState::Failed;
        }
        if self
            .timeout
            .is_some_and(|timeout| elapsed.saturating_add(self.interval) > timeout)
        {
            return PollState::Failed;
        }
        PollState::Polling
    }
}

/// States of a convergence wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollState {
    /// Keep polling after the interval.
    Polling,
    /// The predicate held on the latest snapshot.
    Converged,
    /// The deadline or attempt cap was reached first.
    Failed,
}

/// Errors raised while waiting for convergence.
#[derive(Debug, Error)]
pub enum ConvergenceError<GatewayError>
where
    GatewayError: std::error::Error + 'static,
{
    /// A list query failed.
    #[error("failed to list instances: {0}")]
    Gateway(#[source] GatewayError),
    /// The target state was not observed in time.
    #[error(
        "convergence timed out after {attempts} attempts ({elapsed:?}); last tick observed {last_observed} instances"
    )]
    Timeout {
        /// Number of list queries issued.
        attempts: u32,
        /// Wall time spent waiting.
        elapsed: Duration,
        /// Instance count on the final snapshot.
        last_observed: usize,
    },
    /// The caller abandoned the wait.
    #[error("convergence wait cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of list queries completed before cancellation.
        attempts: u32,
    },
}

/// Polls a gateway until a caller-supplied predicate holds.
#[derive(Debug)]
pub struct ConvergencePoller<'g, G> {
    gateway: &'g G,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl<'g, G> ConvergencePoller<'g, G>
where
    G: CloudGateway + Sync,
{
    /// Creates a poller over `gateway`.
    #[must_use]
    pub fn new(gateway: &'g G, settings: PollSettings) -> Self {
        Self {
            gateway,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties the poller to an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Polls until `is_converged` returns `true` for a snapshot.
    ///
    /// `on_tick` sees every snapshot, including the one that converged. The
    /// returned snapshot is the first one the predicate accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError::Gateway`] when a list query fails,
    /// [`ConvergenceError::Timeout`] when the deadline or attempt cap is hit,
    /// and [`ConvergenceError::Cancelled`] when the token fires. Cancellation
    /// only stops local waiting.
    pub async fn converge<P, T>(
        &self,
        selector: &str,
        mut is_converged: P,
        mut on_tick: T,
    ) -> Result<ConvergenceSnapshot, ConvergenceError<G::Error>>
    where
        P: FnMut(&ConvergenceSnapshot) -> bool,
        T: FnMut(&ConvergenceSnapshot),
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let listed = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(ConvergenceError::Cancelled { attempts: attempt });
                }
                listed = self.gateway.list(selector) => listed.map_err(ConvergenceError::Gateway)?,
            };
            attempt = attempt.saturating_add(1);

            let snapshot = ConvergenceSnapshot::new(attempt, listed);
            on_tick(&snapshot);
            let converged = is_converged(&snapshot);
            debug!(
                selector,
                attempt,
                observed = snapshot.len(),
                active = snapshot.active_count(),
                converged,
                "convergence tick"
            );

            match self
                .settings
                .next_state(converged, attempt, started.elapsed())
            {
                PollState::Converged => {
                    info!(selector, attempt, "converged");
                    return Ok(snapshot);
                }
                PollState::Failed => {
                    return Err(ConvergenceError::Timeout {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        last_observed: snapshot.len(),
                    });
                }
                PollState::Polling => {}
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(ConvergenceError::Cancelled { attempts: attempt });
                }
                () = sleep(self.settings.interval) => {}
            }
        }
    }
}

/// Predicate for create waits: exactly `target` instances are active.
#[must_use]
pub fn all_active(target: usize) -> impl Fn(&ConvergenceSnapshot) -> bool {
    move |snapshot| snapshot.active_count() == target
}

/// Predicate for destroy waits: nothing matches the selector any more.
#[must_use]
pub fn none_remaining() -> impl Fn(&ConvergenceSnapshot) -> bool {
    ConvergenceSnapshot::is_empty
}
