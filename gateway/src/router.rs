//! Cost-aware model routing.
//!
//! The router turns an intent plus conversation into a backend call:
//! classify the intent into a cost tier, gather models at that tier or
//! above whose provider is enabled and whose circuit admits traffic, and
//! take the cheapest. The context guard and retry orchestrator then wrap
//! the actual call, and every completed request lands in the decision log.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendCaller, BackendResponse};
use crate::circuit::CircuitBreaker;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::guard::ContextGuard;
use crate::retry::{FailureClass, RetryOrchestrator};
use crate::store::SharedStateStore;
use crate::types::{CostTier, FilterVerdict, Message, ModelId, Role};

/// Pre-routing content screen. Detection lives upstream; this seam only
/// delivers the verdict.
pub trait ContentFilter: Send + Sync {
    fn check(&self, intent: &str, conversation: &[Message]) -> FilterVerdict;
}

/// Filter that lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveFilter;

impl ContentFilter for PermissiveFilter {
    fn check(&self, _intent: &str, _conversation: &[Message]) -> FilterVerdict {
        FilterVerdict::clean()
    }
}

const PREMIUM_KEYWORDS: [&str; 7] = [
    "architecture",
    "architect",
    "design",
    "security",
    "audit",
    "migrate",
    "distributed",
];

const STANDARD_KEYWORDS: [&str; 8] = [
    "implement",
    "refactor",
    "debug",
    "analyze",
    "review",
    "fix",
    "optimize",
    "test",
];

/// Classify an intent into the minimum cost tier worth paying for it.
///
/// Keyword buckets first, then length as a tiebreaker: long intents tend
/// to describe work that cheap models mangle.
pub fn desired_tier(intent: &str) -> CostTier {
    let lowered = intent.to_lowercase();
    if PREMIUM_KEYWORDS.iter().any(|k| lowered.contains(k)) || intent.len() > 600 {
        return CostTier::Premium;
    }
    if STANDARD_KEYWORDS.iter().any(|k| lowered.contains(k)) || intent.len() > 200 {
        return CostTier::Standard;
    }
    CostTier::Economy
}

/// A successfully routed request.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub response: BackendResponse,
    /// The audit record that was appended to the decision log.
    pub decision: crate::types::RoutingDecision,
}

/// The routing gateway.
pub struct Router {
    config: GatewayConfig,
    breaker: Arc<CircuitBreaker>,
    guard: ContextGuard,
    orchestrator: RetryOrchestrator,
    store: SharedStateStore,
    filter: Box<dyn ContentFilter>,
}

impl Router {
    /// Build a router, hydrating circuit state from the store so breakers
    /// survive restarts.
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn BackendCaller>,
        store: SharedStateStore,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.failure_threshold,
            config.cooldown_secs,
        ));
        for model in ModelId::all().iter().copied() {
            match store.get_circuit(model) {
                Ok(Some(snapshot)) => breaker.restore(model, snapshot),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "failed to load circuit state")
                }
            }
        }

        let guard = ContextGuard::new(&config);
        let orchestrator = RetryOrchestrator::new(
            backend,
            breaker.clone(),
            config.fallback_model,
            Duration::from_secs(config.call_timeout_secs),
        );

        Self {
            config,
            breaker,
            guard,
            orchestrator,
            store,
            filter: Box::new(PermissiveFilter),
        }
    }

    /// Replace the content filter.
    pub fn with_filter(mut self, filter: Box<dyn ContentFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the context guard, typically to swap its estimator.
    pub fn with_guard(mut self, guard: ContextGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The circuit breaker registry, for inspection.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Models at or above the tier, cheapest first, provider-enabled and
    /// priced. Circuit eligibility is checked at claim time.
    fn candidates(&self, tier: CostTier) -> Vec<(ModelId, f64)> {
        let mut candidates: Vec<(ModelId, f64)> = ModelId::all()
            .iter()
            .copied()
            .filter(|m| self.config.available_providers.contains(&m.provider()))
            .filter(|m| self.config.tier(*m).is_some_and(|t| t >= tier))
            .filter_map(|m| self.config.cost_rate(m).map(|rate| (m, rate)))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates
    }

    fn persist_circuit(&self, model: ModelId) {
        if let Err(e) = self.store.put_circuit(model, self.breaker.snapshot(model)) {
            tracing::warn!(model = %model, error = %e, "failed to persist circuit state");
        }
    }

    /// Route one request end to end.
    pub async fn route(
        &self,
        intent: &str,
        conversation: &[Message],
    ) -> GatewayResult<RouteOutcome> {
        let verdict = self.filter.check(intent, conversation);
        if verdict.blocked {
            tracing::warn!(
                categories = verdict.flagged_categories,
                "request blocked by content filter"
            );
            return Err(GatewayError::BlockedContent {
                categories: verdict.flagged_categories,
            });
        }

        debug_assert!(
            conversation.iter().any(|m| m.role == Role::User),
            "conversation must contain at least one user message"
        );

        let tier = desired_tier(intent);

        // Claim the cheapest model whose circuit admits traffic. acquire()
        // also takes the single half-open probe slot, so two concurrent
        // requests cannot both probe a recovering model.
        let mut selected = None;
        for (model, rate) in self.candidates(tier) {
            if self.breaker.acquire(model) {
                selected = Some((model, rate));
                break;
            }
        }
        let Some((model_selected, _)) = selected else {
            return Err(GatewayError::NoEligibleModel {
                tier,
                providers: self.config.available_providers.len(),
            });
        };

        let guarded = self.guard.guard(model_selected, conversation);
        if guarded.model != model_selected {
            // The override diverted traffic away from the claimed model;
            // give back its probe slot and claim the fallback's instead.
            // An oversized request can only go to the fallback model, so
            // a refusing fallback circuit leaves nothing eligible.
            self.breaker.release(model_selected);
            if !self.breaker.acquire(guarded.model) {
                tracing::warn!(
                    model = %guarded.model,
                    "fallback circuit refused the oversized request"
                );
                return Err(GatewayError::NoEligibleModel {
                    tier,
                    providers: self.config.available_providers.len(),
                });
            }
        }

        let invocation = self
            .orchestrator
            .invoke(&guarded.conversation, guarded.model)
            .await;

        match invocation {
            Ok(outcome) => {
                if outcome.fell_back {
                    self.breaker.release(guarded.model);
                }
                self.breaker.record_success(outcome.model_used);
                self.persist_circuit(outcome.model_used);

                let cost_rate_used = self.config.cost_rate(outcome.model_used).unwrap_or(0.0);
                let decision = crate::types::RoutingDecision::new(
                    intent,
                    model_selected,
                    outcome.model_used,
                    guarded.estimated_tokens,
                    guarded.overridden,
                    cost_rate_used,
                );
                if let Err(e) = self.store.append_decision(decision.clone()) {
                    tracing::warn!(error = %e, "failed to record routing decision");
                }

                tracing::info!(
                    intent_tier = %tier,
                    selected = %model_selected,
                    used = %outcome.model_used,
                    tokens = guarded.estimated_tokens,
                    attempts = outcome.attempts,
                    overridden = guarded.overridden,
                    "request routed"
                );

                Ok(RouteOutcome {
                    response: outcome.response,
                    decision,
                })
            }
            Err(failure) => {
                if failure.model != guarded.model {
                    // A failed silent retry still releases the original
                    // model's probe slot.
                    self.breaker.release(guarded.model);
                }
                self.breaker.record_failure(failure.model);
                self.persist_circuit(failure.model);

                match failure.class {
                    FailureClass::Overflow => Err(GatewayError::ContextOverflow {
                        model: failure.model,
                        failure: failure.failure,
                    }),
                    FailureClass::Transient | FailureClass::Other => {
                        Err(GatewayError::TransientBackend {
                            model: failure.model,
                            failure: failure.failure,
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_classification() {
        assert_eq!(desired_tier("what time is it"), CostTier::Economy);
        assert_eq!(desired_tier("fix this off-by-one"), CostTier::Standard);
        assert_eq!(desired_tier("review my security audit"), CostTier::Premium);
        assert_eq!(
            desired_tier("design a distributed cache"),
            CostTier::Premium
        );
    }

    #[test]
    fn test_tier_by_length() {
        let medium = "a".repeat(250);
        assert_eq!(desired_tier(&medium), CostTier::Standard);
        let long = "a".repeat(650);
        assert_eq!(desired_tier(&long), CostTier::Premium);
    }

    #[test]
    fn test_keyword_matching_case_insensitive() {
        assert_eq!(desired_tier("REFACTOR the parser"), CostTier::Standard);
        assert_eq!(desired_tier("Architecture question"), CostTier::Premium);
    }

    #[test]
    fn test_permissive_filter() {
        let verdict = PermissiveFilter.check("anything", &[Message::user("hi")]);
        assert!(!verdict.blocked);
        assert_eq!(verdict.flagged_categories, 0);
    }
}
