//! Circuit breaker guarding one call site.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed broken, calls fail fast
//! - Half-Open: a single trial call probes for recovery
//! - Isolated: manually held open until [`CircuitBreakerPolicy::reset`]
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call after the break duration
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! Half-Open → Half-Open: trial ends in an unhandled error, slot released
//! any → Isolated: isolate(); Isolated → Closed: reset()
//! ```
//!
//! # Design Decisions
//! - One mutex per breaker; never held across an await or an observer call
//! - A failure predicate over outcomes, not raw errors, drives the counter
//! - Errors the predicate does not match pass through without counting or resetting
//! - Single trial in Half-Open; concurrent callers are rejected as if Open
//! - Outcomes from calls admitted before a transition are ignored

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::FutureExt;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::{Outcome, PolicyError};
use crate::resilience::pipeline::{BoxOutcome, Operation, OutcomePredicate, Policy};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
    Isolated,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Isolated => "isolated",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
    Isolated,
}

impl BreakerState {
    fn public(&self) -> CircuitState {
        match self {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
            BreakerState::Isolated => CircuitState::Isolated,
        }
    }
}

/// How a call got through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// How the failure predicate classified an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    Failure,
    Unhandled,
}

/// Transition to report once the state lock is released.
enum Transition {
    Break,
    Reset,
}

pub type BreakObserver<T> = Arc<dyn Fn(&Outcome<T>, Duration) + Send + Sync>;
pub type StateObserver = Arc<dyn Fn() + Send + Sync>;

pub struct CircuitBreakerPolicy<T> {
    inner: Arc<BreakerInner<T>>,
}

struct BreakerInner<T> {
    name: String,
    failure_threshold: u32,
    break_duration: Duration,
    is_failure: OutcomePredicate<T>,
    on_break: Option<BreakObserver<T>>,
    on_reset: Option<StateObserver>,
    on_half_open: Option<StateObserver>,
    state: Mutex<BreakerState>,
}

impl<T> BreakerInner<T> {
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Admission, PolicyError> {
        let mut state = self.lock();
        let now = Instant::now();
        let current = *state;
        match current {
            BreakerState::Closed { .. } => Ok(Admission::Normal),
            BreakerState::Open { until } if now < until => Err(PolicyError::CircuitOpen {
                policy: self.name.clone(),
                retry_after: until - now,
            }),
            BreakerState::Open { .. } => {
                *state = BreakerState::HalfOpen {
                    trial_in_flight: true,
                };
                drop(state);
                tracing::info!(policy = %self.name, "Circuit half-open, admitting trial call");
                metrics::record_circuit_transition(&self.name, CircuitState::HalfOpen.as_str());
                if let Some(observer) = &self.on_half_open {
                    observer();
                }
                Ok(Admission::Trial)
            }
            BreakerState::HalfOpen {
                trial_in_flight: true,
            } => Err(PolicyError::CircuitOpen {
                policy: self.name.clone(),
                retry_after: Duration::ZERO,
            }),
            BreakerState::HalfOpen {
                trial_in_flight: false,
            } => {
                *state = BreakerState::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(Admission::Trial)
            }
            BreakerState::Isolated => Err(PolicyError::CircuitIsolated {
                policy: self.name.clone(),
            }),
        }
    }

    fn record(&self, admission: Admission, outcome: &Outcome<T>) {
        let verdict = if (self.is_failure)(outcome) {
            Verdict::Failure
        } else if outcome.is_ok() {
            Verdict::Success
        } else {
            Verdict::Unhandled
        };
        let mut state = self.lock();

        let transition = match (*state, admission, verdict) {
            (BreakerState::Closed { .. }, Admission::Normal, Verdict::Success) => {
                *state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
                None
            }
            (
                BreakerState::Closed {
                    consecutive_failures,
                },
                Admission::Normal,
                Verdict::Failure,
            ) => {
                if consecutive_failures + 1 >= self.failure_threshold {
                    *state = BreakerState::Open {
                        until: Instant::now() + self.break_duration,
                    };
                    Some(Transition::Break)
                } else {
                    *state = BreakerState::Closed {
                        consecutive_failures: consecutive_failures + 1,
                    };
                    None
                }
            }
            (BreakerState::HalfOpen { .. }, Admission::Trial, Verdict::Failure) => {
                *state = BreakerState::Open {
                    until: Instant::now() + self.break_duration,
                };
                Some(Transition::Break)
            }
            (BreakerState::HalfOpen { .. }, Admission::Trial, Verdict::Success) => {
                *state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
                Some(Transition::Reset)
            }
            (BreakerState::HalfOpen { .. }, Admission::Trial, Verdict::Unhandled) => {
                *state = BreakerState::HalfOpen {
                    trial_in_flight: false,
                };
                None
            }
            // Unhandled errors in Closed, and stale outcomes, leave the state alone.
            _ => None,
        };
        drop(state);

        match transition {
            Some(Transition::Break) => {
                tracing::warn!(
                    policy = %self.name,
                    break_ms = self.break_duration.as_millis() as u64,
                    "Circuit open"
                );
                metrics::record_circuit_transition(&self.name, CircuitState::Open.as_str());
                if let Some(observer) = &self.on_break {
                    observer(outcome, self.break_duration);
                }
            }
            Some(Transition::Reset) => self.notify_reset(),
            None => {}
        }
    }

    fn notify_reset(&self) {
        tracing::info!(policy = %self.name, "Circuit closed");
        metrics::record_circuit_transition(&self.name, CircuitState::Closed.as_str());
        if let Some(observer) = &self.on_reset {
            observer();
        }
    }

    /// Frees the half-open slot when a trial never reported back.
    fn abandon_trial(&self) {
        let mut state = self.lock();
        if let BreakerState::HalfOpen {
            trial_in_flight: true,
        } = *state
        {
            *state = BreakerState::HalfOpen {
                trial_in_flight: false,
            };
        }
    }
}

/// Releases an unfinished trial if the call is dropped mid-flight.
struct TrialGuard<T> {
    inner: Option<Arc<BreakerInner<T>>>,
}

impl<T> TrialGuard<T> {
    fn disarm(&mut self) {
        self.inner = None;
    }
}

impl<T> Drop for TrialGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            tracing::debug!(policy = %inner.name, "Trial call abandoned");
            inner.abandon_trial();
        }
    }
}

impl<T> Clone for CircuitBreakerPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for CircuitBreakerPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("name", &self.inner.name)
            .field("failure_threshold", &self.inner.failure_threshold)
            .field("break_duration", &self.inner.break_duration)
            .field("state", &*self.inner.lock())
            .finish()
    }
}

impl<T: Send + 'static> CircuitBreakerPolicy<T> {
    pub fn builder(name: impl Into<String>) -> CircuitBreakerPolicyBuilder<T> {
        CircuitBreakerPolicyBuilder::new(name)
    }

    /// Current state. An elapsed Open state still reports Open until the next
    /// call moves it to Half-Open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().public()
    }

    /// Consecutive failures counted while Closed; zero otherwise.
    pub fn consecutive_failures(&self) -> u32 {
        match *self.inner.lock() {
            BreakerState::Closed {
                consecutive_failures,
            } => consecutive_failures,
            _ => 0,
        }
    }

    /// Hold the circuit open until [`reset`](Self::reset).
    pub fn isolate(&self) {
        *self.inner.lock() = BreakerState::Isolated;
        tracing::warn!(policy = %self.inner.name, "Circuit isolated");
        metrics::record_circuit_transition(&self.inner.name, CircuitState::Isolated.as_str());
    }

    /// Force the circuit closed and clear the failure count.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::Closed {
            consecutive_failures: 0,
        };
        self.inner.notify_reset();
    }

    async fn run(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let admission = match self.inner.admit() {
            Ok(admission) => admission,
            Err(rejection) => {
                tracing::info!(
                    policy = %self.inner.name,
                    kind = rejection.kind(),
                    "Call rejected by circuit"
                );
                metrics::record_rejection(&self.inner.name, rejection.kind());
                return Err(rejection);
            }
        };

        let mut guard = TrialGuard {
            inner: (admission == Admission::Trial).then(|| Arc::clone(&self.inner)),
        };
        let outcome = next(ctx).await;
        guard.disarm();

        self.inner.record(admission, &outcome);
        outcome
    }
}

impl<T: Send + 'static> Policy<T> for CircuitBreakerPolicy<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}

pub struct CircuitBreakerPolicyBuilder<T> {
    name: String,
    failure_threshold: u32,
    break_duration: Duration,
    is_failure: OutcomePredicate<T>,
    on_break: Option<BreakObserver<T>>,
    on_reset: Option<StateObserver>,
    on_half_open: Option<StateObserver>,
}

impl<T: Send + 'static> CircuitBreakerPolicyBuilder<T> {
    /// Defaults: threshold 5, 30s break, every error counts as a failure.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
            is_failure: Arc::new(|outcome: &Outcome<T>| outcome.is_err()),
            on_break: None,
            on_reset: None,
            on_half_open: None,
        }
    }

    /// Consecutive failures that open the circuit; clamped to at least 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Decide which outcomes count as failures.
    pub fn handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(predicate);
        self
    }

    pub fn on_break<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Outcome<T>, Duration) + Send + Sync + 'static,
    {
        self.on_break = Some(Arc::new(observer));
        self
    }

    pub fn on_reset<F>(mut self, observer: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_reset = Some(Arc::new(observer));
        self
    }

    pub fn on_half_open<F>(mut self, observer: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_half_open = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> CircuitBreakerPolicy<T> {
        CircuitBreakerPolicy {
            inner: Arc::new(BreakerInner {
                name: self.name,
                failure_threshold: self.failure_threshold,
                break_duration: self.break_duration,
                is_failure: self.is_failure,
                on_break: self.on_break,
                on_reset: self.on_reset,
                on_half_open: self.on_half_open,
                state: Mutex::new(BreakerState::Closed {
                    consecutive_failures: 0,
                }),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::pipeline::operation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RATE_LIMITED: u16 = 429;

    /// Returns 429 for the first `limited` calls, then 200.
    fn rate_limited(limited: usize, calls: &Arc<AtomicUsize>) -> Operation<u16> {
        let calls = Arc::clone(calls);
        operation(move |_ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n < limited { RATE_LIMITED } else { 200 }) }
        })
    }

    fn breaker(events: &Arc<Mutex<Vec<&'static str>>>) -> CircuitBreakerPolicy<u16> {
        let (on_break, on_reset, on_half_open) =
            (Arc::clone(events), Arc::clone(events), Arc::clone(events));
        CircuitBreakerPolicy::builder("cb")
            .failure_threshold(3)
            .break_duration(Duration::from_secs(2))
            .handle(|outcome: &Outcome<u16>| matches!(outcome, Ok(RATE_LIMITED)))
            .on_break(move |_, _| on_break.lock().unwrap().push("break"))
            .on_reset(move || on_reset.lock().unwrap().push("reset"))
            .on_half_open(move || on_half_open.lock().unwrap().push("half-open"))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_then_trial_closes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let calls = Arc::new(AtomicUsize::new(0));
        let op = rate_limited(3, &calls);

        for _ in 0..3 {
            let outcome = cb.execute(ExecutionContext::new(), op.clone()).await;
            assert_eq!(outcome.unwrap(), RATE_LIMITED);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Rejected without reaching the operation.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let outcome = cb.execute(ExecutionContext::new(), op.clone()).await;
        match outcome {
            Err(PolicyError::CircuitOpen { retry_after, .. }) => {
                assert!(retry_after <= Duration::from_millis(500));
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let outcome = cb.execute(ExecutionContext::new(), op.clone()).await;
        assert_eq!(outcome.unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(*events.lock().unwrap(), vec!["break", "half-open", "reset"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let limited = operation(|_| async { Ok(RATE_LIMITED) });
        let ok = operation(|_| async { Ok(200u16) });

        for _ in 0..2 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        assert_eq!(cb.consecutive_failures(), 2);
        let _ = cb.execute(ExecutionContext::new(), ok.clone()).await;
        assert_eq!(cb.consecutive_failures(), 0);
        for _ in 0..2 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let calls = Arc::new(AtomicUsize::new(0));
        let op = rate_limited(usize::MAX, &calls);

        for _ in 0..3 {
            let _ = cb.execute(ExecutionContext::new(), op.clone()).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        let outcome = cb.execute(ExecutionContext::new(), op.clone()).await;
        assert_eq!(outcome.unwrap(), RATE_LIMITED);
        assert_eq!(cb.state(), CircuitState::Open);

        let outcome = cb.execute(ExecutionContext::new(), op.clone()).await;
        assert!(outcome.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(*events.lock().unwrap(), vec!["break", "half-open", "break"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhandled_error_keeps_failure_count() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let limited = operation(|_| async { Ok(RATE_LIMITED) });
        let reset_by_peer = operation(|_| async { Err(PolicyError::message("conn reset")) });

        for _ in 0..2 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        let outcome = cb.execute(ExecutionContext::new(), reset_by_peer).await;
        assert!(outcome.unwrap_err().is_operation());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);

        // The next handled failure is the third in a row.
        let _ = cb.execute(ExecutionContext::new(), limited).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(*events.lock().unwrap(), vec!["break"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_with_unhandled_error_stays_half_open() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let limited = operation(|_| async { Ok(RATE_LIMITED) });
        for _ in 0..3 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let timed_out = operation(|_| async {
            Err::<u16, _>(PolicyError::Timeout {
                policy: "timeout".into(),
                after: Duration::from_millis(100),
            })
        });
        let outcome = cb.execute(ExecutionContext::new(), timed_out).await;
        assert!(outcome.unwrap_err().is_timeout());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(*events.lock().unwrap(), vec!["break", "half-open"]);

        // Slot was released, so the next caller becomes the trial.
        let outcome = cb
            .execute(ExecutionContext::new(), operation(|_| async { Ok(200u16) }))
            .await;
        assert_eq!(outcome.unwrap(), 200);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(*events.lock().unwrap(), vec!["break", "half-open", "reset"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_in_half_open() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let limited = operation(|_| async { Ok(RATE_LIMITED) });
        for _ in 0..3 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let slow = operation(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(200u16)
            }
        });

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cb = cb.clone();
                let slow = slow.clone();
                tokio::spawn(async move { cb.execute(ExecutionContext::new(), slow).await })
            })
            .collect();

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) if e.is_circuit_open() => rejected += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(rejected, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_frees_slot() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        let limited = operation(|_| async { Ok(RATE_LIMITED) });
        for _ in 0..3 {
            let _ = cb.execute(ExecutionContext::new(), limited.clone()).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let hang = operation(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(200u16)
        });
        let call = cb.execute(ExecutionContext::new(), hang);
        let abandoned = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let outcome = cb
            .execute(ExecutionContext::new(), operation(|_| async { Ok(200u16) }))
            .await;
        assert_eq!(outcome.unwrap(), 200);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_isolate_and_reset() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let cb = breaker(&events);
        cb.isolate();
        let outcome = cb
            .execute(ExecutionContext::new(), operation(|_| async { Ok(200u16) }))
            .await;
        assert!(matches!(outcome, Err(PolicyError::CircuitIsolated { .. })));

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        let outcome = cb
            .execute(ExecutionContext::new(), operation(|_| async { Ok(200u16) }))
            .await;
        assert_eq!(outcome.unwrap(), 200);
        assert_eq!(*events.lock().unwrap(), vec!["reset"]);
    }

    #[tokio::test]
    async fn test_default_predicate_counts_errors() {
        let cb: CircuitBreakerPolicy<u16> = CircuitBreakerPolicy::builder("cb")
            .failure_threshold(1)
            .build();
        let failing = operation(|_| async { Err::<u16, _>(PolicyError::message("down")) });
        let _ = cb.execute(ExecutionContext::new(), failing).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
