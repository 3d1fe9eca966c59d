//! Pre-flight context guard.
//!
//! Runs before any backend call and applies two of the three context
//! protections: a hard override to the safe fallback model when the
//! conversation exceeds the safety threshold, and just-in-time compaction
//! when it sits inside the warning band below that threshold. The third
//! protection, the silent retry, lives in the retry orchestrator.

use std::sync::Arc;

use crate::budget::{BudgetEstimator, HeuristicEstimator};
use crate::compactor::Compactor;
use crate::config::GatewayConfig;
use crate::types::{Message, ModelId};

/// Outcome of the pre-flight check: the model to actually call and the
/// conversation to send it.
#[derive(Debug, Clone)]
pub struct GuardVerdict {
    /// Model the call should go to (may differ from the requested one).
    pub model: ModelId,
    /// True when the guard substituted the fallback model.
    pub overridden: bool,
    /// Conversation to send, compacted if the guard decided to.
    pub conversation: Vec<Message>,
    /// Estimated token footprint of the original conversation.
    pub estimated_tokens: u64,
}

/// Pre-flight inspector applied to every routed request.
pub struct ContextGuard {
    estimator: Arc<dyn BudgetEstimator>,
    compactor: Compactor,
    safety_threshold: u64,
    compaction_low: u64,
    fallback_model: ModelId,
}

impl ContextGuard {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            estimator: Arc::new(HeuristicEstimator::default()),
            compactor: Compactor::default(),
            safety_threshold: config.safety_threshold,
            compaction_low: config.compaction_low,
            fallback_model: config.fallback_model,
        }
    }

    /// Swap in a different estimation strategy.
    pub fn with_estimator(mut self, estimator: Arc<dyn BudgetEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Inspect the conversation and decide how the call should proceed.
    ///
    /// Above the safety threshold the selected model is replaced with the
    /// fallback and the conversation passes through untouched. Inside the
    /// band `[compaction_low, safety_threshold]` the history is compacted
    /// and the model kept. Below the band nothing changes. The two
    /// interventions never combine on a single request.
    pub fn guard(&self, model: ModelId, conversation: &[Message]) -> GuardVerdict {
        let estimated_tokens = self.estimator.estimate(conversation);

        if estimated_tokens > self.safety_threshold {
            tracing::warn!(
                tokens = estimated_tokens,
                threshold = self.safety_threshold,
                from = %model,
                to = %self.fallback_model,
                "context exceeds safety threshold, overriding model"
            );
            return GuardVerdict {
                model: self.fallback_model,
                overridden: true,
                conversation: conversation.to_vec(),
                estimated_tokens,
            };
        }

        if estimated_tokens >= self.compaction_low {
            let compacted = self.compactor.compact(conversation);
            tracing::info!(
                tokens = estimated_tokens,
                before = conversation.len(),
                after = compacted.len(),
                "context in warning band, compacting history"
            );
            return GuardVerdict {
                model,
                overridden: false,
                conversation: compacted,
                estimated_tokens,
            };
        }

        GuardVerdict {
            model,
            overridden: false,
            conversation: conversation.to_vec(),
            estimated_tokens,
        }
    }
}
