use serde::{Deserialize, Serialize};
use solace_schema::PartialAnalysis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Reply text with any structured-analysis block already stripped.
    pub text: String,
    /// Structured analysis the model attached, if any. Absent or malformed
    /// blocks parse to `None`, never to an error.
    pub analysis: Option<PartialAnalysis>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationKind {
    UserInput,
    AiResponse,
}

impl ModerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserInput => "user_input",
            Self::AiResponse => "ai_response",
        }
    }
}

/// Categorical severity reported by the remote moderation model. Mapped to a
/// risk level by the safety layer; the remote path never asserts crisis on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationSeverity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub flagged: bool,
    pub categories: Vec<String>,
    pub severity: ModerationSeverity,
}

/// Split a reply into its prose and a trailing fenced `json` analysis block.
///
/// Deep-tier models are prompted to append their structured analysis as a
/// fenced block. A missing or malformed block yields `None`; the prose is
/// returned untouched in that case.
pub fn extract_analysis_block(raw: &str) -> (String, Option<PartialAnalysis>) {
    let Some(fence_start) = raw.rfind("```json") else {
        return (raw.trim().to_string(), None);
    };
    let after_fence = &raw[fence_start + "```json".len()..];
    let Some(fence_end) = after_fence.find("```") else {
        return (raw.trim().to_string(), None);
    };
    let block = &after_fence[..fence_end];
    match serde_json::from_str::<PartialAnalysis>(block) {
        Ok(analysis) => {
            let mut text = String::with_capacity(raw.len());
            text.push_str(&raw[..fence_start]);
            text.push_str(&after_fence[fence_end + "```".len()..]);
            (text.trim().to_string(), Some(analysis))
        }
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed analysis block");
            (raw.trim().to_string(), None)
        }
    }
}
