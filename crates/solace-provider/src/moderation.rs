use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{ModerationKind, ModerationOutcome, ModerationProvider, ModerationSeverity, ProviderConfig};

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Thresholds over the per-category scores the moderation endpoint returns.
const HIGH_SCORE: f64 = 0.8;
const MEDIUM_SCORE: f64 = 0.5;
const LOW_SCORE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct OpenAiModerationProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl OpenAiModerationProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_base: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl ModerationProvider for OpenAiModerationProvider {
    async fn moderate(&self, text: &str, kind: ModerationKind) -> Result<ModerationOutcome> {
        let url = format!("{}/v1/moderations", self.api_base);
        let resp = self
            .client
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&ApiRequest { input: text })
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("moderation api error ({status}): {body}");
        }

        let body: ApiResponse = resp.json().await?;
        let result = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("moderation api returned no results"))?;

        let outcome = map_result(result);
        tracing::debug!(
            kind = kind.as_str(),
            flagged = outcome.flagged,
            severity = ?outcome.severity,
            "moderation check completed"
        );
        Ok(outcome)
    }
}

fn map_result(result: ApiResult) -> ModerationOutcome {
    let categories: Vec<String> = result
        .categories
        .iter()
        .filter(|(_, &flagged)| flagged)
        .map(|(name, _)| name.clone())
        .collect();

    let top_score = result
        .category_scores
        .values()
        .fold(0.0_f64, |acc, &s| acc.max(s));
    let severity = if top_score >= HIGH_SCORE {
        ModerationSeverity::High
    } else if top_score >= MEDIUM_SCORE {
        ModerationSeverity::Medium
    } else if top_score >= LOW_SCORE {
        ModerationSeverity::Low
    } else {
        ModerationSeverity::None
    };

    ModerationOutcome {
        flagged: result.flagged,
        categories,
        severity,
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    results: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
    #[serde(default)]
    category_scores: BTreeMap<String, f64>,
}
