//! Cost- and reliability-aware routing gateway for multi-provider LLM
//! backends.
//!
//! The gateway sits between callers and a set of chat-completion
//! providers. For each request it classifies the caller's intent into a
//! cost tier, picks the cheapest eligible model, and wraps the call in
//! three layers of context protection (a pre-flight override for
//! oversized conversations, just-in-time history compaction, and a
//! silent retry on provider-reported overflow) plus per-model circuit
//! breakers that quarantine failing backends.
//!
//! Entry point is [`Router`]; everything else is the machinery behind it.

pub mod backend;
pub mod budget;
pub mod circuit;
pub mod compactor;
pub mod config;
pub mod error;
pub mod guard;
pub mod retry;
pub mod router;
pub mod store;
pub mod types;

pub use backend::{
    AlwaysFailingBackend, BackendCaller, BackendFailure, BackendResponse, HangingBackend,
    HttpBackend, MockBackend,
};
pub use budget::{BudgetEstimator, FixedEstimator, HeuristicEstimator};
pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use compactor::{Compactor, COMPACTION_MARKER};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use guard::{ContextGuard, GuardVerdict};
pub use retry::{
    classify_failure, FailureClass, InvocationFailure, InvocationOutcome, RetryOrchestrator,
};
pub use router::{desired_tier, ContentFilter, PermissiveFilter, RouteOutcome, Router};
pub use store::{
    summarize_decisions, DecisionSummary, InMemoryStore, JsonFileStore, SharedStateStore,
    StateStore, StoreError, StoreResult,
};
pub use types::{
    CostTier, FilterVerdict, Message, ModelId, Provider, Role, RoutingDecision,
};
