//! Core types for routing requests and decisions
//!
//! Conversations are transient, built per request and discarded after the
//! call completes. Only the [`RoutingDecision`] summary outlives a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A single conversation message
///
/// Ordered sequences of messages form a conversation. Order is
/// chronological and semantically meaningful — messages are never
/// reordered, only truncated or summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Backend vendor serving one or more models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    Xai,
}

impl Provider {
    /// All known providers
    pub fn all() -> &'static [Provider] {
        &[
            Provider::Anthropic,
            Provider::OpenAi,
            Provider::Google,
            Provider::Xai,
        ]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Google => write!(f, "google"),
            Self::Xai => write!(f, "xai"),
        }
    }
}

/// Identifier for a routable backend model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    /// Claude Opus — most capable, most expensive
    Opus,
    /// Claude Sonnet — balanced capability and cost
    Sonnet,
    /// Claude Haiku — fast and cheap
    Haiku,
    /// GPT-5 — general-purpose mid tier
    Gpt5,
    /// Gemini 2.5 Pro — high-context safe fallback
    GeminiPro,
    /// Gemini 2.5 Flash — cheapest option
    Flash,
    /// Grok 2 — mid tier
    Grok2,
    /// Grok 3 — capable tier
    Grok3,
}

impl ModelId {
    /// The vendor/model string used in API requests
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Opus => "anthropic/claude-opus-4.1",
            Self::Sonnet => "anthropic/claude-sonnet-4",
            Self::Haiku => "anthropic/claude-haiku-3.5",
            Self::Gpt5 => "openai/gpt-5",
            Self::GeminiPro => "google/gemini-2.5-pro",
            Self::Flash => "google/gemini-2.5-flash",
            Self::Grok2 => "xai/grok-2",
            Self::Grok3 => "xai/grok-3",
        }
    }

    /// The provider serving this model
    pub fn provider(&self) -> Provider {
        match self {
            Self::Opus | Self::Sonnet | Self::Haiku => Provider::Anthropic,
            Self::Gpt5 => Provider::OpenAi,
            Self::GeminiPro | Self::Flash => Provider::Google,
            Self::Grok2 | Self::Grok3 => Provider::Xai,
        }
    }

    /// All routable model IDs
    pub fn all() -> &'static [ModelId] {
        &[
            ModelId::Opus,
            ModelId::Sonnet,
            ModelId::Haiku,
            ModelId::Gpt5,
            ModelId::GeminiPro,
            ModelId::Flash,
            ModelId::Grok2,
            ModelId::Grok3,
        ]
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opus => write!(f, "opus"),
            Self::Sonnet => write!(f, "sonnet"),
            Self::Haiku => write!(f, "haiku"),
            Self::Gpt5 => write!(f, "gpt5"),
            Self::GeminiPro => write!(f, "gemini_pro"),
            Self::Flash => write!(f, "flash"),
            Self::Grok2 => write!(f, "grok2"),
            Self::Grok3 => write!(f, "grok3"),
        }
    }
}

/// Coarse capability/price classification used to bias model selection
/// toward the cheapest adequate option
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Economy,
    Standard,
    Premium,
}

impl std::fmt::Display for CostTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Economy => write!(f, "economy"),
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Verdict from the upstream content filter
///
/// Detection itself lives upstream; the router only consumes the verdict
/// and skips routing entirely when `blocked` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterVerdict {
    /// Whether the request must not be routed at all
    pub blocked: bool,
    /// Number of sensitive-content categories detected
    pub flagged_categories: u32,
}

impl FilterVerdict {
    /// A clean verdict with nothing flagged
    pub fn clean() -> Self {
        Self {
            blocked: false,
            flagged_categories: 0,
        }
    }

    /// A blocking verdict with the given category count
    pub fn blocked(flagged_categories: u32) -> Self {
        Self {
            blocked: true,
            flagged_categories,
        }
    }
}

/// Immutable record of one completed routing request
///
/// Created by the router, persisted by the state store, never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Unique decision identifier
    pub id: String,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// The caller-supplied intent text
    pub intent: String,
    /// Model the router chose before any context-armor override
    pub model_selected: ModelId,
    /// Model that actually executed the call
    pub model_used: ModelId,
    /// Token estimate for the conversation at guard time
    pub context_tokens: u64,
    /// Whether the pre-flight audit overrode the cost-based choice
    pub overridden: bool,
    /// Cost rate (per 1M tokens) of the model that executed
    pub cost_rate_used: f64,
}

impl RoutingDecision {
    pub fn new(
        intent: impl Into<String>,
        model_selected: ModelId,
        model_used: ModelId,
        context_tokens: u64,
        overridden: bool,
        cost_rate_used: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            intent: intent.into(),
            model_selected,
            model_used,
            context_tokens,
            overridden,
            cost_rate_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_providers() {
        assert_eq!(ModelId::Opus.provider(), Provider::Anthropic);
        assert_eq!(ModelId::Gpt5.provider(), Provider::OpenAi);
        assert_eq!(ModelId::GeminiPro.provider(), Provider::Google);
        assert_eq!(ModelId::Grok3.provider(), Provider::Xai);
    }

    #[test]
    fn test_api_names() {
        assert_eq!(ModelId::GeminiPro.api_name(), "google/gemini-2.5-pro");
        assert!(ModelId::Opus.api_name().starts_with("anthropic/"));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(CostTier::Economy < CostTier::Standard);
        assert!(CostTier::Standard < CostTier::Premium);
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert_eq!(Message::system("s").role, Role::System);
    }

    #[test]
    fn test_filter_verdict() {
        assert!(!FilterVerdict::clean().blocked);
        let blocked = FilterVerdict::blocked(2);
        assert!(blocked.blocked);
        assert_eq!(blocked.flagged_categories, 2);
    }

    #[test]
    fn test_decision_serde() {
        let decision =
            RoutingDecision::new("fix a bug", ModelId::Haiku, ModelId::GeminiPro, 1234, true, 1.25);
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: RoutingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model_selected, ModelId::Haiku);
        assert_eq!(parsed.model_used, ModelId::GeminiPro);
        assert!(parsed.overridden);
        assert_eq!(parsed.context_tokens, 1234);
    }

    #[test]
    fn test_model_id_serde_snake_case() {
        let json = serde_json::to_string(&ModelId::GeminiPro).unwrap();
        assert_eq!(json, "\"gemini_pro\"");
    }

    #[test]
    fn test_all_models_have_distinct_api_names() {
        let mut names: Vec<&str> = ModelId::all().iter().map(|m| m.api_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ModelId::all().len());
    }
}
