//! State persistence.
//!
//! Two stores sit behind the [`StateStore`] trait: an in-memory one for
//! tests and embedders that do not care about restarts, and a JSON file
//! store that persists circuit snapshots and the routing decision log so
//! breaker state and spend accounting survive a process restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit::CircuitSnapshot;
use crate::types::{ModelId, RoutingDecision};

/// Decisions retained in the persisted log before the oldest are dropped.
const MAX_DECISIONS: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("state lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for circuit state and the decision log.
pub trait StateStore: Send + Sync {
    /// Fetch the persisted circuit snapshot for a model, if any.
    fn get_circuit(&self, model: ModelId) -> StoreResult<Option<CircuitSnapshot>>;

    /// Persist a model's circuit snapshot.
    fn put_circuit(&self, model: ModelId, snapshot: CircuitSnapshot) -> StoreResult<()>;

    /// Append one routing decision to the log.
    fn append_decision(&self, decision: RoutingDecision) -> StoreResult<()>;

    /// The most recent `n` decisions, oldest first.
    fn recent_decisions(&self, n: usize) -> StoreResult<Vec<RoutingDecision>>;
}

pub type SharedStateStore = Arc<dyn StateStore>;

/// Volatile store backed by in-process maps.
#[derive(Default)]
pub struct InMemoryStore {
    circuits: RwLock<HashMap<ModelId, CircuitSnapshot>>,
    decisions: RwLock<Vec<RoutingDecision>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStore {
    fn get_circuit(&self, model: ModelId) -> StoreResult<Option<CircuitSnapshot>> {
        let circuits = self.circuits.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(circuits.get(&model).copied())
    }

    fn put_circuit(&self, model: ModelId, snapshot: CircuitSnapshot) -> StoreResult<()> {
        let mut circuits = self.circuits.write().map_err(|_| StoreError::LockPoisoned)?;
        circuits.insert(model, snapshot);
        Ok(())
    }

    fn append_decision(&self, decision: RoutingDecision) -> StoreResult<()> {
        let mut decisions = self.decisions.write().map_err(|_| StoreError::LockPoisoned)?;
        decisions.push(decision);
        if decisions.len() > MAX_DECISIONS {
            let excess = decisions.len() - MAX_DECISIONS;
            decisions.drain(..excess);
        }
        Ok(())
    }

    fn recent_decisions(&self, n: usize) -> StoreResult<Vec<RoutingDecision>> {
        let decisions = self.decisions.read().map_err(|_| StoreError::LockPoisoned)?;
        let start = decisions.len().saturating_sub(n);
        Ok(decisions[start..].to_vec())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    circuits: HashMap<ModelId, CircuitSnapshot>,
    decisions: Vec<RoutingDecision>,
}

/// File-backed store writing the whole state as pretty JSON on every
/// mutation. Fine for the request rates a routing gateway sees.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<PersistedState>,
}

impl JsonFileStore {
    /// Open the store, loading existing state when the file is present.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?
        } else {
            PersistedState::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn flush(&self, state: &PersistedState) -> StoreResult<()> {
        let serialized = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get_circuit(&self, model: ModelId) -> StoreResult<Option<CircuitSnapshot>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.circuits.get(&model).copied())
    }

    fn put_circuit(&self, model: ModelId, snapshot: CircuitSnapshot) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.circuits.insert(model, snapshot);
        self.flush(&state)
    }

    fn append_decision(&self, decision: RoutingDecision) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.decisions.push(decision);
        if state.decisions.len() > MAX_DECISIONS {
            let excess = state.decisions.len() - MAX_DECISIONS;
            state.decisions.drain(..excess);
        }
        self.flush(&state)
    }

    fn recent_decisions(&self, n: usize) -> StoreResult<Vec<RoutingDecision>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let start = state.decisions.len().saturating_sub(n);
        Ok(state.decisions[start..].to_vec())
    }
}

/// Aggregate view over a slice of the decision log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub total_requests: u64,
    /// Requests where the guard overrode the selected model.
    pub overrides: u64,
    /// Estimated spend in dollars, from context tokens and per-model rates.
    pub estimated_spend: f64,
    pub requests_by_model: HashMap<ModelId, u64>,
}

/// Summarize a run of routing decisions for reporting.
pub fn summarize_decisions(decisions: &[RoutingDecision]) -> DecisionSummary {
    let mut summary = DecisionSummary::default();
    for decision in decisions {
        summary.total_requests += 1;
        if decision.overridden {
            summary.overrides += 1;
        }
        summary.estimated_spend +=
            decision.context_tokens as f64 * decision.cost_rate_used / 1_000_000.0;
        *summary
            .requests_by_model
            .entry(decision.model_used)
            .or_insert(0) += 1;
    }
    summary
}
