//! Failure classification and the silent overflow retry.
//!
//! Every backend call passes through here. When the first attempt dies of
//! a context-overflow failure the orchestrator retries exactly once on
//! the safe fallback model, invisibly to the caller. Every other failure
//! propagates after the single attempt.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendCaller, BackendFailure, BackendResponse};
use crate::circuit::CircuitBreaker;
use crate::types::{Message, ModelId};

/// What kind of failure a backend call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The conversation did not fit the model's context window.
    Overflow,
    /// Timeout, throttling, or a server-side error worth counting
    /// against the model's circuit.
    Transient,
    /// Anything else; not retryable here.
    Other,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Overflow => write!(f, "overflow"),
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Other => write!(f, "other"),
        }
    }
}

/// Message fragments providers use to signal a blown context window.
const OVERFLOW_MARKERS: [&str; 3] = [
    "context_length_exceeded",
    "maximum context length",
    "prompt is too long",
];

/// Classify a backend failure.
///
/// Providers disagree on how they report overflow: some return a typed
/// error code in the body, some just a 400 or 422 with prose. Both
/// signals map to [`FailureClass::Overflow`] here.
pub fn classify_failure(failure: &BackendFailure) -> FailureClass {
    if matches!(failure.status, Some(400) | Some(422)) {
        return FailureClass::Overflow;
    }
    let lowered = failure.message.to_lowercase();
    if OVERFLOW_MARKERS.iter().any(|m| lowered.contains(m)) {
        return FailureClass::Overflow;
    }
    if failure.timed_out {
        return FailureClass::Transient;
    }
    match failure.status {
        Some(408) | Some(429) => FailureClass::Transient,
        Some(s) if (500..=599).contains(&s) => FailureClass::Transient,
        _ => FailureClass::Other,
    }
}

/// A completed invocation, possibly via the fallback model.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub response: BackendResponse,
    /// Model that actually served the request.
    pub model_used: ModelId,
    /// Attempts made, 1 or 2.
    pub attempts: u32,
    /// True when the silent retry substituted the fallback model.
    pub fell_back: bool,
}

/// A failed invocation, after any retry was exhausted.
#[derive(Debug)]
pub struct InvocationFailure {
    /// Model whose call produced the terminal failure.
    pub model: ModelId,
    pub failure: BackendFailure,
    pub class: FailureClass,
    pub attempts: u32,
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} invocation of {} failed after {} attempt(s): {}",
            self.class, self.model, self.attempts, self.failure
        )
    }
}

impl std::error::Error for InvocationFailure {}

/// Wraps the backend with timeout enforcement and the overflow retry.
pub struct RetryOrchestrator {
    backend: Arc<dyn BackendCaller>,
    breaker: Arc<CircuitBreaker>,
    fallback_model: ModelId,
    call_timeout: Duration,
}

impl RetryOrchestrator {
    pub fn new(
        backend: Arc<dyn BackendCaller>,
        breaker: Arc<CircuitBreaker>,
        fallback_model: ModelId,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            breaker,
            fallback_model,
            call_timeout,
        }
    }

    async fn attempt(
        &self,
        conversation: &[Message],
        model: ModelId,
    ) -> Result<BackendResponse, BackendFailure> {
        match tokio::time::timeout(self.call_timeout, self.backend.call(conversation, model)).await
        {
            Ok(result) => result,
            Err(_) => Err(BackendFailure::timeout(self.call_timeout.as_secs())),
        }
    }

    /// Invoke the backend on `model`, retrying once on the fallback model
    /// if the first attempt overflows. A first attempt already aimed at
    /// the fallback model is never retried, and the retry claims the
    /// fallback model's circuit slot first: if its circuit is open or
    /// another request holds the half-open probe, the original overflow
    /// failure is terminal. The caller records the terminal outcome
    /// against the model that produced it, which frees any claimed slot.
    pub async fn invoke(
        &self,
        conversation: &[Message],
        model: ModelId,
    ) -> Result<InvocationOutcome, InvocationFailure> {
        match self.attempt(conversation, model).await {
            Ok(response) => Ok(InvocationOutcome {
                response,
                model_used: model,
                attempts: 1,
                fell_back: false,
            }),
            Err(failure) => {
                let class = classify_failure(&failure);
                if class != FailureClass::Overflow || model == self.fallback_model {
                    return Err(InvocationFailure {
                        model,
                        failure,
                        class,
                        attempts: 1,
                    });
                }

                if !self.breaker.acquire(self.fallback_model) {
                    tracing::warn!(
                        model = %self.fallback_model,
                        "fallback circuit refused the overflow retry"
                    );
                    return Err(InvocationFailure {
                        model,
                        failure,
                        class,
                        attempts: 1,
                    });
                }

                tracing::warn!(
                    from = %model,
                    to = %self.fallback_model,
                    error = %failure,
                    "overflow on first attempt, retrying on fallback model"
                );
                match self.attempt(conversation, self.fallback_model).await {
                    Ok(response) => Ok(InvocationOutcome {
                        response,
                        model_used: self.fallback_model,
                        attempts: 2,
                        fell_back: true,
                    }),
                    Err(retry_failure) => {
                        let class = classify_failure(&retry_failure);
                        Err(InvocationFailure {
                            model: self.fallback_model,
                            failure: retry_failure,
                            class,
                            attempts: 2,
                        })
                    }
                }
            }
        }
    }
}
