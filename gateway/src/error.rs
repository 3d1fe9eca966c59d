//! Gateway error type.

use thiserror::Error;

use crate::backend::BackendFailure;
use crate::types::{CostTier, ModelId};

/// Terminal errors surfaced to callers of the router.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The conversation overflowed the context window of every model that
    /// was tried, fallback included.
    #[error("context overflow on {model}: {failure}")]
    ContextOverflow {
        model: ModelId,
        failure: BackendFailure,
    },

    /// A transient backend failure that was not retryable here. The
    /// model's circuit has already absorbed it.
    #[error("transient backend failure on {model}: {failure}")]
    TransientBackend {
        model: ModelId,
        failure: BackendFailure,
    },

    /// No model satisfied tier, provider, and circuit constraints. No
    /// backend call was made.
    #[error("no eligible model at tier {tier} or above across {providers} provider(s)")]
    NoEligibleModel { tier: CostTier, providers: usize },

    /// The content filter refused the request before routing.
    #[error("request blocked by content filter ({categories} flagged categories)")]
    BlockedContent { categories: u32 },
}

pub type GatewayResult<T> = Result<T, GatewayError>;
