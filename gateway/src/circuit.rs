//! Per-model circuit breakers.
//!
//! Each model carries an independent breaker so a misbehaving backend is
//! quarantined without dragging down its siblings. State moves lazily:
//! there is no background timer, an open circuit transitions to half-open
//! the first time it is queried after the cooldown elapses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::ModelId;

/// Circuit breaker state for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, failures are being counted.
    Closed,
    /// Tripped; the model is skipped until the cooldown elapses.
    Open,
    /// Cooldown elapsed; a single probe request is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Serializable view of one breaker, for persistence across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Unix seconds at which the circuit last opened, if it ever did.
    pub opened_at_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct CircuitRecord {
    state: CircuitState,
    failure_count: u32,
    opened_at_secs: Option<u64>,
    /// True while a half-open probe request is in flight.
    probe_in_flight: bool,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at_secs: None,
            probe_in_flight: false,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Registry of per-model breakers guarding backend calls.
pub struct CircuitBreaker {
    records: Mutex<HashMap<ModelId, CircuitRecord>>,
    failure_threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failure_threshold,
            cooldown_secs,
        }
    }

    fn with_record<T>(&self, model: ModelId, f: impl FnOnce(&mut CircuitRecord) -> T) -> T {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let record = records.entry(model).or_default();
        Self::refresh(record, self.cooldown_secs);
        f(record)
    }

    /// Move an open circuit to half-open once its cooldown has elapsed.
    fn refresh(record: &mut CircuitRecord, cooldown_secs: u64) {
        if record.state == CircuitState::Open {
            let elapsed = record
                .opened_at_secs
                .map(|t| unix_now().saturating_sub(t))
                .unwrap_or(0);
            if elapsed >= cooldown_secs {
                record.state = CircuitState::HalfOpen;
                record.probe_in_flight = false;
            }
        }
    }

    /// Whether a request may be routed to this model right now.
    ///
    /// A half-open circuit is eligible only while no probe is in flight;
    /// callers that intend to send a request must `acquire` the slot.
    pub fn is_eligible(&self, model: ModelId) -> bool {
        self.with_record(model, |record| match record.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !record.probe_in_flight,
        })
    }

    /// Claim the right to send a request to this model. Returns false if
    /// the circuit is open or a half-open probe is already in flight.
    pub fn acquire(&self, model: ModelId) -> bool {
        self.with_record(model, |record| match record.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if record.probe_in_flight {
                    false
                } else {
                    record.probe_in_flight = true;
                    true
                }
            }
        })
    }

    /// Release a claimed slot without reporting an outcome. Used when a
    /// request acquired a model but was diverted before the call was made.
    pub fn release(&self, model: ModelId) {
        self.with_record(model, |record| {
            record.probe_in_flight = false;
        });
    }

    /// Record a successful call to the model.
    pub fn record_success(&self, model: ModelId) {
        self.with_record(model, |record| match record.state {
            CircuitState::Closed => {
                record.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                tracing::info!(model = %model, "probe succeeded, closing circuit");
                record.state = CircuitState::Closed;
                record.failure_count = 0;
                record.opened_at_secs = None;
                record.probe_in_flight = false;
            }
            // Stray success while open (a call that raced the trip) does
            // not shortcut the cooldown.
            CircuitState::Open => {}
        });
    }

    /// Record a failed call to the model.
    pub fn record_failure(&self, model: ModelId) {
        let threshold = self.failure_threshold;
        self.with_record(model, |record| match record.state {
            CircuitState::Closed => {
                record.failure_count += 1;
                if record.failure_count >= threshold {
                    tracing::warn!(
                        model = %model,
                        failures = record.failure_count,
                        "failure threshold reached, opening circuit"
                    );
                    record.state = CircuitState::Open;
                    record.opened_at_secs = Some(unix_now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(model = %model, "probe failed, reopening circuit");
                record.failure_count += 1;
                record.state = CircuitState::Open;
                record.opened_at_secs = Some(unix_now());
                record.probe_in_flight = false;
            }
            // A failure reported against an already-open circuit still
            // counts and restarts the cooldown clock.
            CircuitState::Open => {
                record.failure_count += 1;
                record.opened_at_secs = Some(unix_now());
            }
        });
    }

    /// Current state of the model's circuit.
    pub fn state(&self, model: ModelId) -> CircuitState {
        self.with_record(model, |record| record.state)
    }

    /// Consecutive failure count while closed.
    pub fn failure_count(&self, model: ModelId) -> u32 {
        self.with_record(model, |record| record.failure_count)
    }

    /// Serializable snapshot of one model's circuit.
    pub fn snapshot(&self, model: ModelId) -> CircuitSnapshot {
        self.with_record(model, |record| CircuitSnapshot {
            state: record.state,
            failure_count: record.failure_count,
            opened_at_secs: record.opened_at_secs,
        })
    }

    /// Restore a model's circuit from a persisted snapshot. The probe
    /// slot is never restored as occupied.
    pub fn restore(&self, model: ModelId, snapshot: CircuitSnapshot) {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.insert(
            model,
            CircuitRecord {
                state: snapshot.state,
                failure_count: snapshot.failure_count,
                opened_at_secs: snapshot.opened_at_secs,
                probe_in_flight: false,
            },
        );
    }
}
