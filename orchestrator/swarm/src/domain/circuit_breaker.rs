// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breakers
//!
//! Per-key failure isolation. The coordinator keys breakers by agent, so an
//! agent that keeps failing stops receiving work until its cooldown elapses.
//!
//! ```text
//! closed --N consecutive failures within window--> open
//! open   --cooldown elapsed, next call--------->   half-open (one trial)
//! half-open --trial succeeds--> closed
//! half-open --trial fails-----> open (cooldown restarts)
//! ```
//!
//! Every state-changing method has an `*_at(now)` form taking an explicit
//! instant; the plain forms read `tokio::time::Instant::now()`, so paused-clock
//! tests drive the cooldown deterministically.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use hivemind_core::domain::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// State change reported back to the caller so it can emit `circuit.*` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Opened { consecutive_failures: u32 },
    HalfOpened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for {key}")]
pub struct CircuitOpenError {
    pub key: String,
    /// Time left before a trial call is allowed; `None` while a trial is in flight.
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    /// Instants of the current run of consecutive failures.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trip_count: u32,
    last_transition: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
            trip_count: 0,
            last_transition: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn trip_count(&self) -> u32 {
        self.trip_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.len() as u32
    }

    /// Whether a call would be let through right now. Does not claim the
    /// half-open trial.
    pub fn is_call_permitted_at(&self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.cooldown_elapsed(now),
            CircuitState::HalfOpen => !self.trial_in_flight,
        }
    }

    pub fn is_call_permitted(&self) -> bool {
        self.is_call_permitted_at(Instant::now())
    }

    /// Claim permission for one call. In half-open only the first caller gets
    /// through until the trial is settled.
    pub fn try_acquire_at(
        &mut self,
        now: Instant,
    ) -> Result<Option<CircuitTransition>, CircuitOpenError> {
        match self.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open if self.cooldown_elapsed(now) => {
                self.set_state(CircuitState::HalfOpen);
                self.trial_in_flight = true;
                Ok(Some(CircuitTransition::HalfOpened))
            }
            CircuitState::Open => Err(CircuitOpenError {
                key: self.key.clone(),
                retry_in: self
                    .opened_at
                    .map(|at| self.config.cooldown.saturating_sub(now.duration_since(at))),
            }),
            CircuitState::HalfOpen if !self.trial_in_flight => {
                self.trial_in_flight = true;
                Ok(None)
            }
            CircuitState::HalfOpen => Err(CircuitOpenError {
                key: self.key.clone(),
                retry_in: None,
            }),
        }
    }

    pub fn try_acquire(&mut self) -> Result<Option<CircuitTransition>, CircuitOpenError> {
        self.try_acquire_at(Instant::now())
    }

    pub fn record_success(&mut self) -> Option<CircuitTransition> {
        self.failures.clear();
        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.opened_at = None;
                self.set_state(CircuitState::Closed);
                Some(CircuitTransition::Closed)
            }
            // A late success from a call admitted before the trip.
            CircuitState::Open | CircuitState::Closed => None,
        }
    }

    pub fn record_failure_at(&mut self, now: Instant) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.failures.push_back(now);
                while let Some(oldest) = self.failures.front() {
                    if now.duration_since(*oldest) > self.config.window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.consecutive_failures() >= self.config.failure_threshold {
                    Some(self.trip(now))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.failures.push_back(now);
                self.trial_in_flight = false;
                Some(self.trip(now))
            }
            CircuitState::Open => None,
        }
    }

    pub fn record_failure(&mut self) -> Option<CircuitTransition> {
        self.record_failure_at(Instant::now())
    }

    /// Give back a half-open trial whose call never reached a verdict.
    pub fn abandon_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    pub fn reset(&mut self) {
        self.failures.clear();
        self.opened_at = None;
        self.trial_in_flight = false;
        if self.state != CircuitState::Closed {
            self.set_state(CircuitState::Closed);
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            key: self.key.clone(),
            state: self.state,
            trip_count: self.trip_count,
            consecutive_failures: self.consecutive_failures(),
            last_transition: self.last_transition,
        }
    }

    fn trip(&mut self, now: Instant) -> CircuitTransition {
        let consecutive_failures = self.consecutive_failures();
        self.opened_at = Some(now);
        self.trip_count += 1;
        self.set_state(CircuitState::Open);
        CircuitTransition::Opened {
            consecutive_failures,
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .map(|at| now.duration_since(at) >= self.config.cooldown)
            .unwrap_or(true)
    }

    fn set_state(&mut self, state: CircuitState) {
        self.state = state;
        self.last_transition = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub key: String,
    pub state: CircuitState,
    pub trip_count: u32,
    pub consecutive_failures: u32,
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum CircuitCallError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error("{0}")]
    Inner(E),
}

// ============================================================================
// Manager
// ============================================================================

/// One independently locked breaker per key, created on first use.
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, key: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(existing) = self.breakers.read().get(key) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(CircuitBreaker::new(key, self.config.clone())))
        }))
    }

    fn existing(&self, key: &str) -> Option<Arc<Mutex<CircuitBreaker>>> {
        self.breakers.read().get(key).cloned()
    }

    /// Unknown keys are closed.
    pub fn is_call_permitted(&self, key: &str) -> bool {
        self.existing(key)
            .map(|breaker| breaker.lock().is_call_permitted())
            .unwrap_or(true)
    }

    pub fn state(&self, key: &str) -> CircuitState {
        self.existing(key)
            .map(|breaker| breaker.lock().state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn try_acquire(&self, key: &str) -> Result<Option<CircuitTransition>, CircuitOpenError> {
        let breaker = self.breaker(key);
        let outcome = breaker.lock().try_acquire();
        if let Ok(Some(CircuitTransition::HalfOpened)) = outcome {
            info!(key, "Circuit breaker half-open, admitting trial call");
        }
        outcome
    }

    pub fn record_success(&self, key: &str) -> Option<CircuitTransition> {
        let transition = self.existing(key)?.lock().record_success();
        if transition == Some(CircuitTransition::Closed) {
            info!(key, "Circuit breaker closed after successful trial");
        }
        transition
    }

    pub fn record_failure(&self, key: &str) -> Option<CircuitTransition> {
        let breaker = self.breaker(key);
        let transition = breaker.lock().record_failure();
        if let Some(CircuitTransition::Opened {
            consecutive_failures,
        }) = transition
        {
            warn!(
                key,
                consecutive_failures, "Circuit breaker opened after consecutive failures"
            );
            metrics::counter!("hivemind_circuit_breaker_trips_total").increment(1);
        }
        transition
    }

    pub fn abandon_trial(&self, key: &str) {
        if let Some(breaker) = self.existing(key) {
            breaker.lock().abandon_trial();
        }
    }

    pub fn reset(&self, key: &str) {
        if let Some(breaker) = self.existing(key) {
            breaker.lock().reset();
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.breakers.write().remove(key).is_some()
    }

    /// Metrics for every breaker, sorted by key.
    pub fn metrics(&self) -> Vec<CircuitBreakerMetrics> {
        let breakers: Vec<_> = self.breakers.read().values().cloned().collect();
        let mut metrics: Vec<_> = breakers.iter().map(|b| b.lock().metrics()).collect();
        metrics.sort_by(|a, b| a.key.cmp(&b.key));
        metrics
    }

    /// Run `call` under the breaker for `key`. `Err` outcomes count as
    /// failures; the breaker lock is not held across the call.
    pub async fn execute<F, Fut, T, E>(&self, key: &str, call: F) -> Result<T, CircuitCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire(key)?;
        match call().await {
            Ok(value) => {
                self.record_success(key);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(key);
                Err(CircuitCallError::Inner(err))
            }
        }
    }
}
