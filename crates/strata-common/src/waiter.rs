//! Terminal-state waiter for asynchronous remote operations
//!
//! A [`Waiter`] blocks until an in-flight remote operation reaches a declared
//! success or failure state, or until its deadline passes. Every poll builds
//! and issues a fresh status request, so request parameters (operation ids,
//! stack names) are always current.
//!
//! The outcome is one of exactly three kinds:
//! - `Ok(())` as soon as the success state is observed
//! - [`Error::WaitFailed`] as soon as a failure state is observed
//! - [`Error::WaitTimeout`] with the last observed state once the deadline passes
//!
//! Cancelling the token aborts the wait between polls with [`Error::Cancelled`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::WaitConfig;
use crate::{Error, Result};

/// Waits for one remote operation to reach a terminal state.
///
/// A waiter owns no poll state between calls; concurrent waits for
/// independent resources can each use their own `Waiter` or share one.
#[derive(Clone, Debug)]
pub struct Waiter<S> {
    resource: String,
    operation: String,
    success: S,
    failures: Vec<S>,
    config: WaitConfig,
}

impl<S> Waiter<S>
where
    S: PartialEq + Display,
{
    /// Create a waiter for `operation` on `resource` that succeeds on `success`
    pub fn new(
        resource: impl Into<String>,
        operation: impl Into<String>,
        success: S,
        config: WaitConfig,
    ) -> Self {
        Self {
            resource: resource.into(),
            operation: operation.into(),
            success,
            failures: Vec::new(),
            config,
        }
    }

    /// States that end the wait with [`Error::WaitFailed`]
    pub fn with_failures(mut self, failures: impl IntoIterator<Item = S>) -> Self {
        self.failures.extend(failures);
        self
    }

    /// Poll until a terminal state is observed or the deadline passes.
    ///
    /// `new_request` is invoked once per attempt and must build and issue a
    /// fresh status request. `state_of` reads the current state off its
    /// response. A request that fails is logged and counts as "no new state";
    /// polling continues until the deadline.
    pub async fn wait<R, N, Fut, A>(
        &self,
        cancel: &CancellationToken,
        mut new_request: N,
        state_of: A,
    ) -> Result<()>
    where
        N: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
        A: Fn(&R) -> S,
    {
        let start = Instant::now();
        let mut delay = self.config.initial_delay;
        let mut last_state: Option<String> = None;
        let mut attempt = 0u32;

        info!(
            resource = %self.resource,
            timeout_secs = self.config.timeout.as_secs(),
            "{}",
            self.operation
        );

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }
            attempt += 1;

            match new_request().await {
                Ok(response) => {
                    let state = state_of(&response);
                    if state == self.success {
                        debug!(resource = %self.resource, attempt, state = %state, "Operation succeeded");
                        return Ok(());
                    }
                    if self.failures.contains(&state) {
                        warn!(resource = %self.resource, attempt, state = %state, "Operation reached failure state");
                        return Err(Error::WaitFailed {
                            resource: self.resource.clone(),
                            operation: self.operation.clone(),
                            state: state.to_string(),
                        });
                    }
                    trace!(resource = %self.resource, attempt, state = %state, "Operation still in progress");
                    last_state = Some(state.to_string());
                }
                Err(e) => {
                    warn!(resource = %self.resource, attempt, error = %e, "Status request failed, will poll again");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.config.timeout {
                warn!(
                    resource = %self.resource,
                    attempt,
                    last_state = last_state.as_deref().unwrap_or("none"),
                    "Timed out waiting for terminal state"
                );
                return Err(Error::WaitTimeout {
                    resource: self.resource.clone(),
                    timeout: self.config.timeout,
                    last_state,
                });
            }

            let sleep_for = self.jittered(delay).min(self.config.timeout - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(sleep_for) => {}
            }
            delay = self.config.next_delay(delay);
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.config.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }

    fn cancelled(&self) -> Error {
        Error::cancelled(format!("{} ({})", self.operation, self.resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const IN_PROGRESS: &str = "IN_PROGRESS";
    const SUCCESSFUL: &str = "SUCCESSFUL";
    const FAILED: &str = "FAILED";

    fn waiter(timeout_secs: u64, interval_secs: u64) -> Waiter<&'static str> {
        Waiter::new(
            "demo",
            "waiting for update",
            SUCCESSFUL,
            WaitConfig::fixed(
                Duration::from_secs(timeout_secs),
                Duration::from_secs(interval_secs),
            ),
        )
        .with_failures([FAILED, "CANCELLED"])
    }

    /// Replays `states` in order, repeating the last one forever
    fn scripted(
        states: Vec<&'static str>,
        polls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str>> {
        move || {
            let n = polls.fetch_add(1, Ordering::SeqCst) as usize;
            let state = states[n.min(states.len() - 1)];
            std::future::ready(Ok(state))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_poll_does_not_poll_again() {
        let polls = Arc::new(AtomicU32::new(0));
        let result = waiter(60, 5)
            .wait(
                &CancellationToken::new(),
                scripted(vec![SUCCESSFUL], polls.clone()),
                |s| *s,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_state_stops_polling_immediately() {
        let polls = Arc::new(AtomicU32::new(0));
        let result = waiter(600, 5)
            .wait(
                &CancellationToken::new(),
                scripted(vec![IN_PROGRESS, IN_PROGRESS, FAILED, SUCCESSFUL], polls.clone()),
                |s| *s,
            )
            .await;

        match result {
            Err(Error::WaitFailed { state, resource, .. }) => {
                assert_eq!(state, FAILED);
                assert_eq!(resource, "demo");
            }
            other => panic!("expected WaitFailed, got {other:?}"),
        }
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_observed_state() {
        let polls = Arc::new(AtomicU32::new(0));
        let result = waiter(10, 3)
            .wait(
                &CancellationToken::new(),
                scripted(vec!["PENDING", IN_PROGRESS], polls.clone()),
                |s| *s,
            )
            .await;

        match result {
            Err(Error::WaitTimeout {
                last_state,
                timeout,
                ..
            }) => {
                assert_eq!(last_state.as_deref(), Some(IN_PROGRESS));
                assert_eq!(timeout, Duration::from_secs(10));
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
        // polls at t=0,3,6,9 and a final one at the deadline
        assert_eq!(polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn request_errors_are_tolerated_until_success() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();
        let result = waiter(60, 1)
            .wait(
                &CancellationToken::new(),
                move || {
                    let n = p.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(Error::stack_api("demo", "throttled"))
                        } else {
                            Ok(SUCCESSFUL)
                        }
                    }
                },
                |s| *s,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_any_state_has_no_last_state() {
        let result = waiter(4, 1)
            .wait(
                &CancellationToken::new(),
                || async { Err::<&'static str, _>(Error::stack_api("demo", "unreachable")) },
                |s| *s,
            )
            .await;

        match result {
            Err(Error::WaitTimeout { last_state, .. }) => assert!(last_state.is_none()),
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_poll_builds_a_fresh_request() {
        let built = Arc::new(AtomicU32::new(0));
        let b = built.clone();
        let result = waiter(60, 1)
            .wait(
                &CancellationToken::new(),
                move || {
                    let request_id = b.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok(request_id) }
                },
                |id| if *id == 3 { SUCCESSFUL } else { IN_PROGRESS },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let polls = Arc::new(AtomicU32::new(0));
        let result = waiter(3600, 300)
            .wait(&cancel, scripted(vec![IN_PROGRESS], polls.clone()), |s| *s)
            .await;

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_polls() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let polls = Arc::new(AtomicU32::new(0));
        let result = waiter(60, 1)
            .wait(&cancel, scripted(vec![SUCCESSFUL], polls.clone()), |s| *s)
            .await;

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }
}
