use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use solace_memory::{ConversationStore, UsageDecision};
use solace_provider::{GenerationProvider, GenerationRequest, LlmMessage};
use solace_safety::{InputSafetyGate, OutputSafetyGate};
use solace_schema::{
    AnalysisRecord, ChatMessage, Conversation, ConversationContext, MessageRole, PartialAnalysis,
    RiskLevel, SafetyVerdict, TierDecision,
};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::SolaceConfig;
use crate::error::TurnError;
use crate::merge::{patterns_sum_valid, should_surface, AnalysisMerger};
use crate::scripts;
use crate::tier::{has_complex_emotional_content, route, RouteSignals};

/// How much history is replayed to the generation model and to the gates.
const CONTEXT_WINDOW: usize = 12;
const TITLE_MAX_CHARS: usize = 48;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub is_session_end: bool,
    #[serde(default)]
    pub requires_deep_analysis: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub reply_text: String,
    pub analysis: Option<AnalysisRecord>,
    pub crisis_detected: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub usage_limit: i64,
    pub usage_period: Duration,
    pub fast_model: String,
    pub deep_model: String,
    pub max_tokens: u32,
}

impl OrchestratorSettings {
    pub fn from_config(config: &SolaceConfig) -> Self {
        Self {
            usage_limit: config.usage.daily_limit,
            usage_period: Duration::hours(config.usage.period_hours),
            fast_model: config.generation.fast_model.clone(),
            deep_model: config.generation.deep_model.clone(),
            max_tokens: config.generation.max_tokens,
        }
    }
}

/// Top-level per-message state machine:
/// received -> input-checked -> {crisis-responded | generating} ->
/// output-checked -> persisted -> responded.
///
/// The crisis branch is terminal and never touches the generation provider.
pub struct DialogueOrchestrator {
    input_gate: InputSafetyGate,
    output_gate: OutputSafetyGate,
    generation: Arc<dyn GenerationProvider>,
    store: ConversationStore,
    merger: AnalysisMerger,
    settings: OrchestratorSettings,
}

impl DialogueOrchestrator {
    pub fn new(
        input_gate: InputSafetyGate,
        output_gate: OutputSafetyGate,
        generation: Arc<dyn GenerationProvider>,
        store: ConversationStore,
        merger: AnalysisMerger,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            input_gate,
            output_gate,
            generation,
            store,
            merger,
            settings,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub async fn send_turn(&self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let mut prelude = self.run_prelude(&request).await?;
        if let Some(outcome) = prelude.crisis_outcome.take() {
            return Ok(outcome);
        }

        let gen_request = self.build_generation_request(&prelude);
        let model = gen_request.model.clone();
        let response = match self.generation.chat(gen_request).await {
            Ok(r) => r,
            Err(source) => {
                return Err(self.handle_generation_failure(&prelude.conversation, source).await?);
            }
        };
        tracing::debug!(
            conversation_id = %prelude.conversation.id,
            model,
            output_tokens = response.output_tokens,
            "generation completed"
        );

        self.finish_turn(&prelude, response.text, response.analysis)
            .await
    }

    /// Streaming variant. Deltas are forwarded as they arrive, but the
    /// accumulated text still passes the output gate before persistence. A
    /// stream that dies mid-generation persists whatever arrived; partial
    /// assistant text is never silently dropped.
    pub async fn send_turn_streaming<F>(
        &self,
        request: TurnRequest,
        mut on_delta: F,
    ) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        let mut prelude = self.run_prelude(&request).await?;
        if let Some(outcome) = prelude.crisis_outcome.take() {
            return Ok(outcome);
        }

        let gen_request = self.build_generation_request(&prelude);
        let mut stream = match self.generation.stream(gen_request).await {
            Ok(s) => s,
            Err(source) => {
                return Err(self.handle_generation_failure(&prelude.conversation, source).await?);
            }
        };

        let mut accumulated = String::new();
        let mut stream_error = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        on_delta(&chunk.delta);
                        accumulated.push_str(&chunk.delta);
                    }
                    if chunk.is_final {
                        break;
                    }
                }
                Err(err) => {
                    stream_error = Some(err);
                    break;
                }
            }
        }

        match stream_error {
            Some(source) if accumulated.is_empty() => {
                return Err(self.handle_generation_failure(&prelude.conversation, source).await?);
            }
            Some(source) => {
                tracing::warn!(
                    conversation_id = %prelude.conversation.id,
                    error = %source,
                    accumulated_chars = accumulated.len(),
                    "generation stream ended early, gating partial reply"
                );
            }
            None => {}
        }

        // Streamed replies carry no structured analysis block.
        self.finish_turn(&prelude, accumulated, None).await
    }
}

/// Everything the shared front half of a turn produces: the resolved
/// conversation, the persisted user message's context, the input verdict,
/// and the chosen tier. `crisis_outcome` is set when the turn already
/// terminated in the crisis branch.
struct TurnPrelude {
    conversation: Conversation,
    context: ConversationContext,
    input_verdict: SafetyVerdict,
    tier: TierDecision,
    user_text: String,
    crisis_outcome: Option<TurnOutcome>,
}

impl DialogueOrchestrator {
    async fn run_prelude(&self, request: &TurnRequest) -> Result<TurnPrelude, TurnError> {
        match self
            .store
            .try_consume_usage(
                request.user_id,
                self.settings.usage_limit,
                self.settings.usage_period,
            )
            .await?
        {
            UsageDecision::Denied { limit, resets_at } => {
                return Err(TurnError::UsageLimitExceeded { limit, resets_at });
            }
            UsageDecision::Granted { remaining } => {
                tracing::debug!(user_id = %request.user_id, remaining, "usage granted");
            }
        }

        let conversation = match request.conversation_id {
            Some(id) => self
                .store
                .get_owned(id, request.user_id)
                .await?
                .ok_or(TurnError::ConversationNotFound)?,
            None => {
                self.store
                    .create_conversation(request.user_id, Some(derive_title(&request.text)))
                    .await?
            }
        };

        self.store
            .append_message(conversation.id, MessageRole::User, &request.text)
            .await?;
        let message_count = self.store.message_count(conversation.id).await?;
        let recent = self
            .store
            .recent_messages(conversation.id, CONTEXT_WINDOW)
            .await?;
        let context = ConversationContext {
            user_id: request.user_id,
            conversation_id: conversation.id,
            recent_messages: recent
                .into_iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    text: m.text,
                })
                .collect(),
            message_count,
        };

        let input_verdict = self.input_gate.check(&request.text, &context).await;

        if input_verdict.level == RiskLevel::Crisis {
            let outcome = self.respond_with_crisis_script(&conversation).await?;
            return Ok(TurnPrelude {
                conversation,
                context,
                input_verdict,
                tier: TierDecision::Fast,
                user_text: request.text.clone(),
                crisis_outcome: Some(outcome),
            });
        }

        let signals = RouteSignals {
            message_count,
            is_session_end: request.is_session_end,
            requires_deep_analysis: request.requires_deep_analysis,
            has_complex_emotional_content: has_complex_emotional_content(
                &request.text,
                &input_verdict,
            ),
        };
        let tier = route(&signals);
        tracing::debug!(
            conversation_id = %conversation.id,
            tier = tier.as_str(),
            message_count,
            "tier decided"
        );

        Ok(TurnPrelude {
            conversation,
            context,
            input_verdict,
            tier,
            user_text: request.text.clone(),
            crisis_outcome: None,
        })
    }

    async fn respond_with_crisis_script(
        &self,
        conversation: &Conversation,
    ) -> Result<TurnOutcome, TurnError> {
        tracing::warn!(
            conversation_id = %conversation.id,
            "crisis detected, responding with scripted intervention"
        );
        let stored = self
            .store
            .append_message(
                conversation.id,
                MessageRole::Assistant,
                scripts::CRISIS_INTERVENTION,
            )
            .await?;
        self.store.flag_crisis(conversation.id).await?;
        Ok(TurnOutcome {
            conversation_id: conversation.id,
            message_id: stored.id,
            reply_text: stored.text,
            analysis: None,
            crisis_detected: true,
        })
    }

    fn build_generation_request(&self, prelude: &TurnPrelude) -> GenerationRequest {
        let (model, system) = match prelude.tier {
            TierDecision::Fast => (
                self.settings.fast_model.clone(),
                scripts::FAST_SYSTEM_PROMPT,
            ),
            TierDecision::Deep => (
                self.settings.deep_model.clone(),
                scripts::DEEP_SYSTEM_PROMPT,
            ),
        };
        GenerationRequest {
            model,
            system: Some(system.to_string()),
            messages: prelude
                .context
                .recent_messages
                .iter()
                .map(|m| LlmMessage {
                    role: m.role.as_str().to_string(),
                    content: m.text.clone(),
                })
                .collect(),
            max_tokens: self.settings.max_tokens,
        }
    }

    async fn handle_generation_failure(
        &self,
        conversation: &Conversation,
        source: anyhow::Error,
    ) -> Result<TurnError, TurnError> {
        tracing::error!(
            conversation_id = %conversation.id,
            error = %source,
            "generation failed, persisting apology"
        );
        self.store
            .append_message(
                conversation.id,
                MessageRole::Assistant,
                scripts::GENERATION_FAILURE_APOLOGY,
            )
            .await?;
        self.store.touch(conversation.id).await?;
        Ok(TurnError::GenerationUnavailable { source })
    }

    async fn finish_turn(
        &self,
        prelude: &TurnPrelude,
        raw_reply: String,
        analysis: Option<PartialAnalysis>,
    ) -> Result<TurnOutcome, TurnError> {
        let conversation_id = prelude.conversation.id;
        let output_verdict = self.output_gate.check(&raw_reply, &prelude.user_text);

        let final_text = if !output_verdict.safe {
            // The raw reply is discarded, never persisted. The substituted
            // scripts are static and local, so this path cannot fail.
            tracing::warn!(
                event = "unsafe_output_suppressed",
                conversation_id = %conversation_id,
                level = output_verdict.level.as_str(),
                flags = ?output_verdict.flags,
                "generated reply suppressed, substituting"
            );
            if prelude.input_verdict.requires_intervention {
                scripts::CRISIS_INTERVENTION.to_string()
            } else {
                scripts::SAFE_FALLBACK_REPLY.to_string()
            }
        } else {
            raw_reply
        };

        let stored = self
            .store
            .append_message(conversation_id, MessageRole::Assistant, &final_text)
            .await?;

        let mut surfaced = None;
        if output_verdict.safe {
            if let Some(mut partial) = analysis {
                if !patterns_sum_valid(&partial.patterns) {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        "dropping pattern set with invalid percentage sum"
                    );
                    partial.patterns.clear();
                }
                let existing = self
                    .store
                    .load_analysis(conversation_id)
                    .await?
                    .unwrap_or_default();
                let merged = self
                    .merger
                    .merge(&existing, &partial, prelude.context.message_count);
                self.store.save_analysis(conversation_id, &merged).await?;
                if should_surface(&merged) {
                    surfaced = Some(merged);
                } else {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        "analysis stored but below surfacing confidence"
                    );
                }
            }
        }

        self.store.touch(conversation_id).await?;
        Ok(TurnOutcome {
            conversation_id,
            message_id: stored.id,
            reply_text: stored.text,
            analysis: surfaced,
            crisis_detected: false,
        })
    }
}

fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}
