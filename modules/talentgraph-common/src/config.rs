use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";

/// Secrets and environment-specific values. Tunables live in [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub wikidata_api_url: String,
    pub deepl_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable is required")?,
            wikidata_api_url: std::env::var("WIKIDATA_API_URL")
                .unwrap_or_else(|_| DEFAULT_WIKIDATA_API_URL.to_string()),
            deepl_api_key: std::env::var("DEEPL_API_KEY").ok().filter(|k| !k.is_empty()),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  WIKIDATA_API_URL: {}", self.wikidata_api_url);
        tracing::info!(
            "  DEEPL_API_KEY: {}",
            self.deepl_api_key
                .as_deref()
                .map(preview)
                .unwrap_or_else(|| "<not set>".to_string())
        );
    }
}

// --- TOML-backed tunables ---

/// Engine tunables loaded from a TOML file. Every section and field is
/// optional and falls back to its default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub influence: InfluenceConfig,
    pub pacing: PacingConfig,
    pub ingest: IngestConfig,
    pub inference: InferenceConfig,
    pub audit: AuditConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.influence.validate()?;
        if self.pacing.max_attempts == 0 {
            bail!("pacing.max_attempts must be at least 1");
        }
        if !(1..=5).contains(&self.audit.flag_threshold) {
            bail!("audit.flag_threshold must be within 1..=5");
        }
        for (name, c) in [
            ("inference.cofounder_confidence", self.inference.cofounder_confidence),
            ("inference.colleague_confidence", self.inference.colleague_confidence),
        ] {
            if !(0.0..=1.0).contains(&c) {
                bail!("{name} must be within 0..=1, got {c}");
            }
        }
        Ok(())
    }
}

/// Relative weight of each normalized factor in the final influence score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfluenceWeights {
    pub content: f64,
    pub popularity: f64,
    pub academic: f64,
    pub qualitative: f64,
}

impl Default for InfluenceWeights {
    fn default() -> Self {
        Self {
            content: 0.30,
            popularity: 0.25,
            academic: 0.25,
            qualitative: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfluenceConfig {
    pub weights: InfluenceWeights,
    /// Upper bound of every individual factor.
    pub factor_cap: f64,
    /// Linear points per content item before the cap.
    pub content_points_per_item: f64,
    /// `min(cap, scale * log10(count + 1))` for the popularity count.
    pub popularity_log_scale: f64,
    pub citation_log_scale: f64,
    /// Linear points per h-index unit.
    pub h_index_points: f64,
    /// Share of the academic factor taken by citations; h-index takes the rest.
    pub citation_share: f64,
    /// Multiplier turning the 0–10 qualitative rating into 0–100.
    pub qualitative_scale: f64,
}

impl Default for InfluenceConfig {
    fn default() -> Self {
        Self {
            weights: InfluenceWeights::default(),
            factor_cap: 100.0,
            content_points_per_item: 10.0,
            popularity_log_scale: 20.0,
            citation_log_scale: 20.0,
            h_index_points: 2.0,
            citation_share: 0.6,
            qualitative_scale: 10.0,
        }
    }
}

impl InfluenceConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, v) in [
            ("influence.weights.content", w.content),
            ("influence.weights.popularity", w.popularity),
            ("influence.weights.academic", w.academic),
            ("influence.weights.qualitative", w.qualitative),
            ("influence.content_points_per_item", self.content_points_per_item),
            ("influence.popularity_log_scale", self.popularity_log_scale),
            ("influence.citation_log_scale", self.citation_log_scale),
            ("influence.h_index_points", self.h_index_points),
            ("influence.qualitative_scale", self.qualitative_scale),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("{name} must be a non-negative number, got {v}");
            }
        }
        if !self.factor_cap.is_finite() || self.factor_cap <= 0.0 {
            bail!("influence.factor_cap must be positive");
        }
        if !(0.0..=1.0).contains(&self.citation_share) {
            bail!("influence.citation_share must be within 0..=1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    /// Fixed pause between consecutive external calls.
    pub cooldown_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl PacingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub search_limit: u32,
    /// Language names and roles are localized into.
    pub target_language: String,
    /// Role label used when the knowledge graph gives no occupation.
    pub default_role: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            search_limit: 5,
            target_language: "ZH".to_string(),
            default_role: "member".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    pub cofounder_confidence: f64,
    pub colleague_confidence: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            cofounder_confidence: 0.8,
            colleague_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Items scored at or below this relevance (1–5) are flagged for review.
    pub flag_threshold: u8,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { flag_threshold: 2 }
    }
}
