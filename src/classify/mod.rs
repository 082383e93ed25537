// src/classify/mod.rs
//! Classifier gateway: stable `(category, confidence)` contract over a
//! pluggable model.
//!
//! Order inside [`ClassifierGateway::classify`]:
//! 1) no model installed → `Loading` at 0.0
//! 2) signal-style normalization, then the model call (errors → `Loading`)
//! 3) override rules on the full text (first match wins, confidence 1.0)
//! 4) rescue pass for uncertain `Other` verdicts

pub mod category;
pub mod model;
pub mod names;
pub mod normalize;
pub mod rules;

pub use category::Category;
pub use model::{build_model, DynTextModel, FixedModel, HfInferenceModel, TextModel};
pub use rules::{OverrideRule, OverrideRules};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Classifier output. `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub category: Category,
    pub confidence: f32,
}

impl Verdict {
    pub const LOADING: Verdict = Verdict {
        category: Category::Loading,
        confidence: 0.0,
    };

    pub fn is_loading(&self) -> bool {
        self.category == Category::Loading
    }
}

/// Wraps the model with normalization, readiness and keyword rules.
pub struct ClassifierGateway {
    model: RwLock<Option<DynTextModel>>,
    overrides: OverrideRules,
}

impl Default for ClassifierGateway {
    fn default() -> Self {
        Self::new(OverrideRules::default())
    }
}

impl ClassifierGateway {
    /// Gateway with no model yet; everything classifies as `Loading`.
    pub fn new(overrides: OverrideRules) -> Self {
        Self {
            model: RwLock::new(None),
            overrides,
        }
    }

    /// Gateway with a model already installed.
    pub fn with_model(model: DynTextModel, overrides: OverrideRules) -> Self {
        let gw = Self::new(overrides);
        gw.install(model);
        gw
    }

    /// Install (or replace) the model. Later `classify` calls use it.
    pub fn install(&self, model: DynTextModel) {
        tracing::info!(provider = model.name(), "classifier model installed");
        *self.model.write() = Some(model);
    }

    pub fn is_ready(&self) -> bool {
        self.model.read().is_some()
    }

    pub async fn classify(&self, text: &str) -> Verdict {
        // Clone the handle so no lock is held across the await.
        let Some(model) = self.model.read().clone() else {
            return Verdict::LOADING;
        };

        let signal = normalize::to_signal_style(text);
        if signal.is_empty() {
            return Verdict {
                category: Category::Other,
                confidence: 0.0,
            };
        }

        let raw = match model.predict(&signal).await {
            Ok(v) if !v.is_loading() => v,
            Ok(_) => return Verdict::LOADING,
            Err(e) => {
                tracing::warn!(error = ?e, provider = model.name(), "classifier call failed");
                return Verdict::LOADING;
            }
        };

        self.apply_rules(text, raw)
    }

    /// Rule stage on its own, for a verdict that came from the model.
    pub fn apply_rules(&self, text: &str, raw: Verdict) -> Verdict {
        if let Some(v) = self.overrides.apply(text, &raw) {
            return v;
        }
        rules::rescue(text, &raw).unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FailingModel;

    #[async_trait::async_trait]
    impl TextModel for FailingModel {
        async fn predict(&self, _text: &str) -> anyhow::Result<Verdict> {
            Err(anyhow::anyhow!("503 model loading"))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn not_ready_reports_loading() {
        let gw = ClassifierGateway::default();
        assert!(!gw.is_ready());
        let v = gw.classify("Huge wildfire near the city").await;
        assert_eq!(v, Verdict::LOADING);
    }

    #[tokio::test]
    async fn model_errors_degrade_to_loading() {
        let gw = ClassifierGateway::with_model(Arc::new(FailingModel), OverrideRules::default());
        assert!(gw.is_ready());
        assert!(gw.classify("flood").await.is_loading());
    }

    #[tokio::test]
    async fn override_beats_model_verdict() {
        let model = Arc::new(FixedModel::new(Category::Violence, 0.99));
        let gw = ClassifierGateway::with_model(model, OverrideRules::default());
        let v = gw.classify("Several injured as bus overturns").await;
        assert_eq!(v.category, Category::MedicalEmergency);
        assert_eq!(v.confidence, 1.0);
    }

    #[tokio::test]
    async fn override_sees_words_past_the_truncation() {
        let model = Arc::new(FixedModel::new(Category::Other, 0.3));
        let gw = ClassifierGateway::with_model(model, OverrideRules::default());
        let long = format!("{} flood", "word ".repeat(30));
        assert_eq!(gw.classify(&long).await.category, Category::Flood);
    }

    #[tokio::test]
    async fn rescue_applies_after_model() {
        let model = Arc::new(FixedModel::new(Category::Other, 0.4));
        let gw = ClassifierGateway::with_model(model, OverrideRules::default());
        let v = gw.classify("hurricane makes landfall overnight").await;
        assert_eq!(v.category, Category::Storm);
        assert!((v.confidence - rules::RESCUE_CONFIDENCE).abs() < 1e-6);
    }

    #[tokio::test]
    async fn plain_model_verdict_passes_through() {
        let model = Arc::new(FixedModel::new(Category::Violence, 0.8));
        let gw = ClassifierGateway::with_model(model, OverrideRules::default());
        let v = gw.classify("protesters clash with police downtown").await;
        assert_eq!(v.category, Category::Violence);
    }
}
