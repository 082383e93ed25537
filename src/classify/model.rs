//! Model seam: the black-box text classifier behind the gateway.
//!
//! - `TextModel`: async `predict(text) -> Verdict`, shared across tasks.
//! - `HfInferenceModel`: hosted inference over HTTP (Hugging Face compatible).
//! - `FixedModel`: returns one configured verdict; used offline and in tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{Category, Verdict};
use crate::config::{ClassifierSettings, ModelProvider};

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn predict(&self, text: &str) -> Result<Verdict>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynTextModel = Arc<dyn TextModel>;

/// Build the configured model. `None` means classification stays `Loading`.
pub fn build_model(settings: &ClassifierSettings) -> Result<Option<DynTextModel>> {
    match settings.provider {
        ModelProvider::Disabled => Ok(None),
        ModelProvider::Fixed => Ok(Some(Arc::new(FixedModel::new(Category::Other, 0.5)))),
        ModelProvider::Hf => {
            let token = std::env::var(&settings.token_env).unwrap_or_default();
            let model = HfInferenceModel::new(
                &settings.endpoint,
                &settings.model_id,
                token,
                Duration::from_millis(settings.timeout_ms),
            )?;
            Ok(Some(Arc::new(model)))
        }
    }
}

/// Hosted text-classification endpoint.
///
/// POSTs `{"inputs": text}` to `{endpoint}/{model_id}` and accepts either
/// `[[{label, score}, ...]]` or `[{label, score}, ...]`; the top score wins.
pub struct HfInferenceModel {
    http: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl InferenceResponse {
    fn best(self) -> Option<LabelScore> {
        let all = match self {
            InferenceResponse::Nested(v) => v.into_iter().flatten().collect::<Vec<_>>(),
            InferenceResponse::Flat(v) => v,
        };
        all.into_iter()
            .filter(|ls| ls.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

impl HfInferenceModel {
    pub fn new(endpoint: &str, model_id: &str, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("crisis-feed-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building inference http client")?;
        Ok(Self {
            http,
            url: format!("{}/{}", endpoint.trim_end_matches('/'), model_id),
            token,
        })
    }
}

#[async_trait]
impl TextModel for HfInferenceModel {
    async fn predict(&self, text: &str) -> Result<Verdict> {
        let mut req = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": text }));
        if !self.token.is_empty() {
            req = req.bearer_auth(&self.token);
        }
        let resp = req.send().await.context("inference request")?;
        let status = resp.status();
        if !status.is_success() {
            // 503 while the hosted model is still loading.
            return Err(anyhow!("inference endpoint returned {status}"));
        }
        let body: InferenceResponse = resp.json().await.context("inference response body")?;
        let best = body
            .best()
            .ok_or_else(|| anyhow!("inference response had no labels"))?;
        Ok(Verdict {
            category: Category::from_label(&best.label),
            confidence: best.score.clamp(0.0, 1.0),
        })
    }

    fn name(&self) -> &'static str {
        "hf-inference"
    }
}

/// Returns the same verdict for every input.
#[derive(Debug, Clone)]
pub struct FixedModel {
    pub verdict: Verdict,
}

impl FixedModel {
    pub fn new(category: Category, confidence: f32) -> Self {
        Self {
            verdict: Verdict {
                category,
                confidence: confidence.clamp(0.0, 1.0),
            },
        }
    }
}

#[async_trait]
impl TextModel for FixedModel {
    async fn predict(&self, _text: &str) -> Result<Verdict> {
        Ok(self.verdict)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
