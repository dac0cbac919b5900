pub mod anthropic;
pub mod moderation;
pub mod types;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::iter as stream_iter;

pub use anthropic::AnthropicProvider;
pub use moderation::OpenAiModerationProvider;
pub use types::*;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn chat(&self, request: GenerationRequest) -> Result<GenerationResponse>;
    async fn stream(
        &self,
        _request: GenerationRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        anyhow::bail!("streaming not supported by this provider")
    }
}

#[async_trait]
pub trait ModerationProvider: Send + Sync {
    async fn moderate(&self, text: &str, kind: ModerationKind) -> Result<ModerationOutcome>;
}

/// Connection settings for a provider instance, injected at construction.
/// Core never reads the environment; keys and endpoints arrive through this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

pub struct StubProvider;

#[async_trait]
impl GenerationProvider for StubProvider {
    async fn chat(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(GenerationResponse {
            text: format!("[stub:{}] {user_text}", request.model),
            analysis: None,
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        })
    }

    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let full_text = format!("[stub:stream:{}] {user_text}", request.model);
        let mut chunks: Vec<Result<StreamChunk>> = full_text
            .split_whitespace()
            .map(|word| {
                Ok(StreamChunk {
                    delta: format!("{word} "),
                    is_final: false,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            is_final: true,
        }));
        Ok(Box::pin(stream_iter(chunks)))
    }
}
