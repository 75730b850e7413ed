use crate::clock::{system_clock, Clock};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A state change caused by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `closed → open`: the failure threshold was reached.
    Tripped,
    /// `half_open → open`: a trial call failed.
    Reopened,
    /// `half_open → closed`: enough trial calls succeeded.
    Closed,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
    /// Trial calls admitted while half-open; all of them must succeed to close.
    pub half_open_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            half_open_trials: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set how long the breaker stays open before admitting trial calls
    pub fn with_open_duration(mut self, open_duration: Duration) -> Self {
        self.open_duration = open_duration;
        self
    }

    /// Set the number of half-open trial calls
    pub fn with_half_open_trials(mut self, trials: u32) -> Self {
        self.half_open_trials = trials.max(1);
        self
    }
}

/// Rejection returned by [`CircuitBreaker::allow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker for '{service}' is {state}")]
pub struct CircuitOpenError {
    pub service: String,
    pub state: CircuitState,
    /// Time until trial calls are admitted, when known.
    pub retry_after: Option<Duration>,
}

/// Admission token handed out by [`CircuitBreaker::allow`].
///
/// Consumed by exactly one of `record_success` / `record_failure`, so an
/// outcome can never be applied twice. A permit issued before a state change
/// is stale and only updates the last-failure timestamp.
///
/// Dropping an unresolved trial permit (cancelled caller, aborted task) hands
/// its trial slot back, so a half-open breaker can always admit a new trial.
#[must_use = "a permit must be resolved with record_success or record_failure"]
pub struct BreakerPermit {
    generation: u64,
    trial: bool,
    // Set only for trial permits until they are resolved.
    breaker: Option<Arc<Shared>>,
}

impl BreakerPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if let Some(shared) = self.breaker.take() {
            shared.release_trial(self.generation);
        }
    }
}

impl fmt::Debug for BreakerPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("generation", &self.generation)
            .field("trial", &self.trial)
            .field("resolved", &self.breaker.is_none())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub threshold: u32,
    pub open_duration_ms: u64,
    pub half_open_trials: u32,
    pub last_failure: Option<SystemTime>,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub trips: u64,
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_failure: Option<SystemTime>,
    trials_issued: u32,
    generation: u64,
    trips: u64,
}

impl State {
    fn enter(&mut self, next: CircuitState) {
        self.state = next;
        self.generation = self.generation.wrapping_add(1);
        self.consecutive_successes = 0;
        self.trials_issued = 0;
    }
}

struct Shared {
    name: String,
    cfg: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Shared {
    // Counters stay consistent even if a holder panicked mid-update, so a
    // poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release_trial(&self, generation: u64) {
        let mut st = self.lock();
        if st.generation == generation
            && st.state == CircuitState::HalfOpen
            && st.trials_issued > 0
        {
            st.trials_issued -= 1;
            debug!(service = %self.name, "unresolved trial permit dropped, slot released");
        }
    }
}

/// Per-service circuit breaker.
///
/// - Counts consecutive failures while closed; a success resets the count
/// - Opens at the threshold and rejects calls for `open_duration`
/// - Moves to half-open lazily on the first `allow()` after that, admitting
///   `half_open_trials` calls; any trial failure re-opens immediately
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, cfg, system_clock())
    }

    pub fn with_clock(
        name: impl Into<String>,
        cfg: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                cfg,
                clock,
                state: Mutex::new(State {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    consecutive_successes: 0,
                    opened_at: None,
                    last_failure: None,
                    trials_issued: 0,
                    generation: 0,
                    trips: 0,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.cfg
    }

    pub fn allow(&self) -> Result<BreakerPermit, CircuitOpenError> {
        let shared = &self.shared;
        let mut st = shared.lock();

        if st.state == CircuitState::Open {
            let now = shared.clock.now();
            let elapsed = st
                .opened_at
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(shared.cfg.open_duration);
            if elapsed < shared.cfg.open_duration {
                return Err(CircuitOpenError {
                    service: shared.name.clone(),
                    state: CircuitState::Open,
                    retry_after: Some(shared.cfg.open_duration - elapsed),
                });
            }
            st.enter(CircuitState::HalfOpen);
            info!(service = %shared.name, "circuit breaker half-open, admitting trial calls");
        }

        match st.state {
            CircuitState::Closed => Ok(BreakerPermit {
                generation: st.generation,
                trial: false,
                breaker: None,
            }),
            CircuitState::HalfOpen if st.trials_issued < shared.cfg.half_open_trials => {
                st.trials_issued += 1;
                Ok(BreakerPermit {
                    generation: st.generation,
                    trial: true,
                    breaker: Some(Arc::clone(shared)),
                })
            }
            state => Err(CircuitOpenError {
                service: shared.name.clone(),
                state,
                retry_after: None,
            }),
        }
    }

    pub fn record_success(&self, mut permit: BreakerPermit) -> Option<Transition> {
        permit.breaker = None;
        let shared = &self.shared;
        let mut st = shared.lock();
        if permit.generation != st.generation {
            return None;
        }

        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                st.consecutive_successes += 1;
                if st.consecutive_successes >= shared.cfg.half_open_trials {
                    st.enter(CircuitState::Closed);
                    st.consecutive_failures = 0;
                    st.opened_at = None;
                    info!(service = %shared.name, "circuit breaker closed after successful trials");
                    Some(Transition::Closed)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    pub fn record_failure(&self, mut permit: BreakerPermit) -> Option<Transition> {
        permit.breaker = None;
        let shared = &self.shared;
        let mut st = shared.lock();
        st.last_failure = Some(shared.clock.system_time());
        if permit.generation != st.generation {
            return None;
        }

        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                if st.consecutive_failures < shared.cfg.failure_threshold {
                    return None;
                }
                st.enter(CircuitState::Open);
                st.opened_at = Some(shared.clock.now());
                st.trips += 1;
                warn!(
                    service = %shared.name,
                    failures = st.consecutive_failures,
                    open_ms = shared.cfg.open_duration.as_millis() as u64,
                    "circuit breaker tripped"
                );
                Some(Transition::Tripped)
            }
            CircuitState::HalfOpen => {
                st.enter(CircuitState::Open);
                st.opened_at = Some(shared.clock.now());
                warn!(service = %shared.name, "trial call failed, circuit breaker re-opened");
                Some(Transition::Reopened)
            }
            CircuitState::Open => None,
        }
    }

    /// Current state as last stored; an expired open window is reported as
    /// open with zero remaining time until the next `allow()`.
    pub fn state(&self) -> CircuitState {
        self.shared.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let shared = &self.shared;
        let st = shared.lock();
        let open_remaining_ms = match (st.state, st.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = shared.clock.now().saturating_duration_since(at);
                Some(shared.cfg.open_duration.saturating_sub(elapsed).as_millis() as u64)
            }
            _ => None,
        };
        BreakerStatus {
            state: st.state,
            failure_count: st.consecutive_failures,
            success_count: st.consecutive_successes,
            threshold: shared.cfg.failure_threshold,
            open_duration_ms: shared.cfg.open_duration.as_millis() as u64,
            half_open_trials: shared.cfg.half_open_trials,
            last_failure: st.last_failure,
            open_remaining_ms,
            trips: st.trips,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name)
            .field("cfg", &self.shared.cfg)
            .field("state", &self.state())
            .finish()
    }
}
