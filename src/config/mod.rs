// src/config/mod.rs
//! Aggregator configuration.
//!
//! Lookup order for [`AggregatorConfig::load_default`]:
//! 1) `$AGGREGATOR_CONFIG_PATH` (must exist)
//! 2) `config/aggregator.toml`
//! 3) `config/aggregator.json`
//! 4) built-in defaults
//!
//! After loading, `AGGREGATOR_ADAPTER_TIMEOUT_MS` and `AGGREGATOR_MAX_RESULTS`
//! override the corresponding pipeline values.

pub mod sources;

pub use sources::{default_sources, SourceClass, SourceConfig};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::rules::OverrideRule;

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const ENV_ADAPTER_TIMEOUT_MS: &str = "AGGREGATOR_ADAPTER_TIMEOUT_MS";
pub const ENV_MAX_RESULTS: &str = "AGGREGATOR_MAX_RESULTS";

/// Minimum raw classifier confidence required before a novel item is stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    pub curated_min: f32,
    pub broad_net_min: f32,
    /// Bar for items the classifier could only call `Other`.
    pub other_min: f32,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            curated_min: 0.60,
            broad_net_min: 0.75,
            other_min: 0.95,
        }
    }
}

impl AdmissionSettings {
    pub fn min_for(&self, class: SourceClass) -> f32 {
        match class {
            SourceClass::Curated => self.curated_min,
            SourceClass::BroadNet => self.broad_net_min,
        }
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        for (v, fallback) in [
            (&mut self.curated_min, d.curated_min),
            (&mut self.broad_net_min, d.broad_net_min),
            (&mut self.other_min, d.other_min),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&*v) {
                *v = fallback;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub adapter_timeout_ms: u64,
    pub max_items_per_source: usize,
    pub search_items_per_source: usize,
    pub max_results: usize,
    /// How many classifier calls may be in flight within one cycle.
    pub classify_concurrency: usize,
    pub admission: AdmissionSettings,
    /// Where the sweep persists the store; `None` keeps it in memory only.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 3600,
            sweep_interval_secs: 3600,
            adapter_timeout_ms: 8_000,
            max_items_per_source: 5,
            search_items_per_source: 10,
            max_results: 50,
            classify_concurrency: 4,
            admission: AdmissionSettings::default(),
            snapshot_path: None,
        }
    }
}

impl PipelineSettings {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        if self.retention_secs == 0 {
            self.retention_secs = d.retention_secs;
        }
        if self.sweep_interval_secs == 0 {
            self.sweep_interval_secs = d.sweep_interval_secs;
        }
        if self.adapter_timeout_ms == 0 {
            self.adapter_timeout_ms = d.adapter_timeout_ms;
        }
        if self.max_results == 0 {
            self.max_results = d.max_results;
        }
        self.classify_concurrency = self.classify_concurrency.max(1);
        self.admission.sanitize();
    }
}

/// Which [`TextModel`](crate::classify::model::TextModel) backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Hosted inference endpoint (Hugging Face compatible).
    Hf,
    /// Fixed verdict; override and rescue rules do the real work.
    Fixed,
    /// No model: every classification reports `Loading`.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub provider: ModelProvider,
    pub model_id: String,
    pub endpoint: String,
    /// Name of the env var holding the bearer token.
    pub token_env: String,
    pub timeout_ms: u64,
    /// Replaces the built-in override rules when non-empty.
    pub overrides: Vec<OverrideRule>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Hf,
            model_id: "Kenji-X-S/resq-tweet".to_string(),
            endpoint: "https://api-inference.huggingface.co/models".to_string(),
            token_env: "HF_API_TOKEN".to_string(),
            timeout_ms: 10_000,
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            classifier: ClassifierSettings::default(),
            sources: default_sources(),
        }
    }
}

impl AggregatorConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading aggregator config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Env path, then `config/` fallbacks, then defaults; env overrides last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/aggregator.toml");
            let json_p = PathBuf::from("config/aggregator.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ms) = parse_env_u64(ENV_ADAPTER_TIMEOUT_MS).filter(|v| *v > 0) {
            self.pipeline.adapter_timeout_ms = ms;
        }
        if let Some(n) = parse_env_u64(ENV_MAX_RESULTS).filter(|v| *v > 0) {
            self.pipeline.max_results = n as usize;
        }
    }

    fn sanitize(&mut self) {
        self.pipeline.sanitize();
        self.sources.retain(|s| !s.name.trim().is_empty());
        for s in &mut self.sources {
            s.trust_weight = s.trust_weight.min(100);
        }
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AggregatorConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing aggregator json");
    }
    match toml::from_str::<AggregatorConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported aggregator config format: {toml_err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_with_partial_sections_fills_defaults() {
        let s = r#"
[pipeline]
max_results = 20

[[sources]]
name = "GDACS"
trust_weight = 90
class = "curated"
url = "https://example.test/gdacs.xml"
"#;
        let cfg = parse_config(s, "toml").unwrap();
        assert_eq!(cfg.pipeline.max_results, 20);
        assert_eq!(cfg.pipeline.retention_secs, 24 * 3600);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].class, SourceClass::Curated);
        assert_eq!(cfg.classifier.provider, ModelProvider::Hf);
    }

    #[test]
    fn json_is_accepted() {
        let s = r#"{"classifier": {"provider": "fixed"}, "sources": []}"#;
        let cfg = parse_config(s, "json").unwrap();
        assert_eq!(cfg.classifier.provider, ModelProvider::Fixed);
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn sanitize_repairs_out_of_range_values() {
        let mut cfg = AggregatorConfig::default();
        cfg.pipeline.retention_secs = 0;
        cfg.pipeline.classify_concurrency = 0;
        cfg.pipeline.admission.curated_min = 4.0;
        cfg.sanitize();
        assert_eq!(cfg.pipeline.retention_secs, 24 * 3600);
        assert_eq!(cfg.pipeline.classify_concurrency, 1);
        assert!((cfg.pipeline.admission.curated_min - 0.60).abs() < 1e-6);
    }

    #[test]
    fn admission_bar_depends_on_class() {
        let a = AdmissionSettings::default();
        assert!(a.min_for(SourceClass::Curated) < a.min_for(SourceClass::BroadNet));
    }
}
