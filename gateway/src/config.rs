//! Strongly-typed gateway configuration
//!
//! All routing tunables live here: the static cost-rate and cost-tier
//! tables, the available provider set, the context-armor thresholds, and
//! the circuit breaker parameters. Validated once at startup instead of
//! being read out of loosely-typed config objects at call sites.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{CostTier, ModelId, Provider};

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Token estimate above which the pre-flight audit forces the
    /// safe fallback model (Strike 1).
    pub safety_threshold: u64,
    /// Lower bound of the JIT-compaction band (Strike 3). The band is
    /// closed on both ends: `[compaction_low, safety_threshold]`.
    pub compaction_low: u64,
    /// Consecutive failures before a model's circuit opens.
    pub failure_threshold: u32,
    /// Seconds a tripped circuit stays open before probation.
    pub cooldown_secs: u64,
    /// Deadline for a single backend call.
    pub call_timeout_secs: u64,
    /// High-context model reserved for Strike-1 overrides and the
    /// silent overflow retry.
    pub fallback_model: ModelId,
    /// Providers currently enabled for routing.
    pub available_providers: Vec<Provider>,
    /// Cost per 1M estimated input tokens, by model.
    pub cost_rates: HashMap<ModelId, f64>,
    /// Tier classification, by model.
    pub cost_tiers: HashMap<ModelId, CostTier>,
}

impl GatewayConfig {
    /// Validate the configuration.
    ///
    /// Every model must carry a positive cost rate and a tier, the
    /// fallback model must be routable, and the thresholds must form a
    /// non-empty band.
    pub fn validate(&self) -> Result<(), String> {
        if self.compaction_low > self.safety_threshold {
            return Err(format!(
                "compaction_low ({}) must not exceed safety_threshold ({})",
                self.compaction_low, self.safety_threshold
            ));
        }
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        if self.available_providers.is_empty() {
            return Err("at least one provider must be available".to_string());
        }
        if !self.cost_rates.contains_key(&self.fallback_model) {
            return Err(format!(
                "fallback model {} has no cost rate",
                self.fallback_model
            ));
        }
        for (model, rate) in &self.cost_rates {
            if *rate <= 0.0 {
                return Err(format!("cost rate for {} must be positive", model));
            }
            if !self.cost_tiers.contains_key(model) {
                return Err(format!("model {} has a cost rate but no tier", model));
            }
        }
        for model in self.cost_tiers.keys() {
            if !self.cost_rates.contains_key(model) {
                return Err(format!("model {} has a tier but no cost rate", model));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration document.
    ///
    /// Missing fields fall back to defaults, so a partial file tuning
    /// only the circuit breaker is valid.
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, or defaults if it is absent.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::from_toml_str(&text)
    }

    /// Cost rate for a model, if configured.
    pub fn cost_rate(&self, model: ModelId) -> Option<f64> {
        self.cost_rates.get(&model).copied()
    }

    /// Tier for a model, if configured.
    pub fn tier(&self, model: ModelId) -> Option<CostTier> {
        self.cost_tiers.get(&model).copied()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            safety_threshold: 180_000,
            compaction_low: 150_000,
            failure_threshold: 3,
            cooldown_secs: 300,
            call_timeout_secs: 120,
            fallback_model: ModelId::GeminiPro,
            available_providers: Provider::all().to_vec(),
            cost_rates: default_cost_rates(),
            cost_tiers: default_cost_tiers(),
        }
    }
}

/// Default cost table: dollars per 1M estimated input tokens.
pub fn default_cost_rates() -> HashMap<ModelId, f64> {
    HashMap::from([
        (ModelId::Opus, 15.00),
        (ModelId::Sonnet, 3.00),
        (ModelId::Haiku, 0.25),
        (ModelId::Gpt5, 2.00),
        (ModelId::GeminiPro, 1.25),
        (ModelId::Flash, 0.075),
        (ModelId::Grok2, 2.00),
        (ModelId::Grok3, 5.00),
    ])
}

/// Default tier table.
pub fn default_cost_tiers() -> HashMap<ModelId, CostTier> {
    HashMap::from([
        (ModelId::Flash, CostTier::Economy),
        (ModelId::Haiku, CostTier::Economy),
        (ModelId::GeminiPro, CostTier::Standard),
        (ModelId::Gpt5, CostTier::Standard),
        (ModelId::Grok2, CostTier::Standard),
        (ModelId::Sonnet, CostTier::Standard),
        (ModelId::Grok3, CostTier::Premium),
        (ModelId::Opus, CostTier::Premium),
    ])
}
