use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::merge::MergePolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolaceConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub usage: UsageConfig,
    pub generation: GenerationConfig,
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub merge: MergePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    pub daily_limit: i64,
    pub period_hours: i64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50,
            period_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    #[serde(default = "default_deep_model")]
    pub deep_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_moderation_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_database_path() -> String {
    "solace.db".to_string()
}

fn default_fast_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_deep_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_moderation_deadline_ms() -> u64 {
    3000
}

impl SolaceConfig {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config file {path}"))
    }
}
