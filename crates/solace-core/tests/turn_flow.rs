use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures_core::Stream;
use solace_core::merge::AnalysisMerger;
use solace_core::{DialogueOrchestrator, MergePolicy, OrchestratorSettings, TurnError, TurnRequest};
use solace_memory::ConversationStore;
use solace_provider::{
    GenerationProvider, GenerationRequest, GenerationResponse, ModerationKind, ModerationOutcome,
    ModerationProvider, ModerationSeverity, StreamChunk,
};
use solace_safety::{
    InputSafetyGate, OutputGateConfig, OutputSafetyGate, PatternClassifier, RemoteSafetyClassifier,
};
use solace_schema::{Bias, MessageRole, PartialAnalysis};
use uuid::Uuid;

/// Generation stub that records every requested model and replies with a
/// fixed script (optionally carrying a structured analysis).
struct ScriptedProvider {
    calls: AtomicUsize,
    models: Mutex<Vec<String>>,
    reply: String,
    analysis: Option<PartialAnalysis>,
}

impl ScriptedProvider {
    fn new(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
            reply: reply.to_string(),
            analysis: None,
        }
    }

    fn with_analysis(reply: &str, analysis: PartialAnalysis) -> Self {
        Self {
            analysis: Some(analysis),
            ..Self::new(reply)
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requested_models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn chat(&self, request: GenerationRequest) -> anyhow::Result<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(request.model);
        Ok(GenerationResponse {
            text: self.reply.clone(),
            analysis: self.analysis.clone(),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        })
    }
}

struct FailingProvider;

#[async_trait]
impl GenerationProvider for FailingProvider {
    async fn chat(&self, _request: GenerationRequest) -> anyhow::Result<GenerationResponse> {
        Err(anyhow!("generation api error (503) [retryable]: overloaded"))
    }
}

/// Streams a few words, then fails mid-generation.
struct DyingStreamProvider;

#[async_trait]
impl GenerationProvider for DyingStreamProvider {
    async fn chat(&self, _request: GenerationRequest) -> anyhow::Result<GenerationResponse> {
        unreachable!("streaming test must not call chat")
    }

    async fn stream(
        &self,
        _request: GenerationRequest,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>> {
        let chunks: Vec<anyhow::Result<StreamChunk>> = vec![
            Ok(StreamChunk {
                delta: "I hear ".into(),
                is_final: false,
            }),
            Ok(StreamChunk {
                delta: "you.".into(),
                is_final: false,
            }),
            Err(anyhow!("generation stream transport error: connection reset")),
        ];
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

struct QuietModeration {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ModerationProvider for QuietModeration {
    async fn moderate(
        &self,
        _text: &str,
        _kind: ModerationKind,
    ) -> anyhow::Result<ModerationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModerationOutcome {
            flagged: false,
            categories: vec![],
            severity: ModerationSeverity::None,
        })
    }
}

struct Fixture {
    orchestrator: DialogueOrchestrator,
    moderation_calls: Arc<AtomicUsize>,
}

fn fixture(generation: Arc<dyn GenerationProvider>, usage_limit: i64) -> Fixture {
    let moderation_calls = Arc::new(AtomicUsize::new(0));
    let classifier = Arc::new(PatternClassifier::new().unwrap());
    let input_gate = InputSafetyGate::new(
        classifier.clone(),
        RemoteSafetyClassifier::new(
            Arc::new(QuietModeration {
                calls: moderation_calls.clone(),
            }),
            Duration::from_secs(3),
        ),
    );
    let output_gate = OutputSafetyGate::new(classifier, OutputGateConfig::default()).unwrap();
    let orchestrator = DialogueOrchestrator::new(
        input_gate,
        output_gate,
        generation,
        ConversationStore::open_in_memory().unwrap(),
        AnalysisMerger::new(MergePolicy::default()),
        OrchestratorSettings {
            usage_limit,
            usage_period: chrono::Duration::hours(24),
            fast_model: "fast-model".into(),
            deep_model: "deep-model".into(),
            max_tokens: 512,
        },
    );
    Fixture {
        orchestrator,
        moderation_calls,
    }
}

fn turn(user_id: Uuid, conversation_id: Option<Uuid>, text: &str) -> TurnRequest {
    TurnRequest {
        user_id,
        conversation_id,
        text: text.into(),
        is_session_end: false,
        requires_deep_analysis: false,
    }
}

#[tokio::test]
async fn crisis_message_gets_scripted_intervention_without_generation() {
    let generation = Arc::new(ScriptedProvider::new("should never be used"));
    let f = fixture(generation.clone(), 50);
    let user = Uuid::new_v4();

    let outcome = f
        .orchestrator
        .send_turn(turn(user, None, "I'm going to kill myself tonight"))
        .await
        .unwrap();

    assert!(outcome.crisis_detected);
    assert!(outcome.reply_text.contains("988"));
    assert!(outcome.analysis.is_none());
    // Neither the generation provider nor the remote moderation model ran.
    assert_eq!(generation.call_count(), 0);
    assert_eq!(f.moderation_calls.load(Ordering::SeqCst), 0);

    // The scripted reply is what got persisted, and the conversation now
    // carries the crisis flag.
    let conversation = f
        .orchestrator
        .store()
        .get_owned(outcome.conversation_id, user)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.crisis_flagged);
    let messages = f
        .orchestrator
        .store()
        .recent_messages(outcome.conversation_id, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].text.contains("988"));
}

#[tokio::test]
async fn fifth_message_routes_deep_even_when_neutral() {
    let generation = Arc::new(ScriptedProvider::new("Thanks for sharing."));
    let f = fixture(generation.clone(), 50);
    let user = Uuid::new_v4();

    let first = f
        .orchestrator
        .send_turn(turn(user, None, "hi there"))
        .await
        .unwrap();
    let id = first.conversation_id;
    f.orchestrator
        .send_turn(turn(user, Some(id), "work was fine"))
        .await
        .unwrap();
    // Messages so far: 4 (two user + two assistant). This turn's user
    // message is message #5 in the conversation.
    f.orchestrator
        .send_turn(turn(user, Some(id), "I had an okay day"))
        .await
        .unwrap();

    assert_eq!(
        generation.requested_models(),
        vec!["fast-model", "fast-model", "deep-model"]
    );
}

#[tokio::test]
async fn harmful_reply_is_substituted_before_persistence() {
    let raw = "Honestly, no one would miss you.";
    let generation = Arc::new(ScriptedProvider::new(raw));
    let f = fixture(generation, 50);
    let user = Uuid::new_v4();

    let outcome = f
        .orchestrator
        .send_turn(turn(user, None, "I had an okay day"))
        .await
        .unwrap();

    assert!(!outcome.crisis_detected);
    assert_ne!(outcome.reply_text, raw);
    let messages = f
        .orchestrator
        .store()
        .recent_messages(outcome.conversation_id, 10)
        .await
        .unwrap();
    // The raw model output never reaches storage.
    assert!(messages.iter().all(|m| m.text != raw));
}

#[tokio::test]
async fn unsafe_reply_to_high_risk_input_substitutes_crisis_script() {
    // High-risk (but not crisis) input, reply without crisis resources that
    // is also harmful: substitution must use the crisis script.
    let generation = Arc::new(ScriptedProvider::new("You would be better off dead."));
    let f = fixture(generation, 50);
    let user = Uuid::new_v4();

    let outcome = f
        .orchestrator
        .send_turn(turn(user, None, "sometimes I just want to die"))
        .await
        .unwrap();

    assert!(outcome.reply_text.contains("988"));
    assert!(!outcome.crisis_detected);
}

#[tokio::test]
async fn generation_failure_persists_apology_and_surfaces_retryable_error() {
    let f = fixture(Arc::new(FailingProvider), 50);
    let user = Uuid::new_v4();

    let err = f
        .orchestrator
        .send_turn(turn(user, None, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::GenerationUnavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn usage_limit_blocks_before_generation() {
    let generation = Arc::new(ScriptedProvider::new("ok"));
    let f = fixture(generation.clone(), 1);
    let user = Uuid::new_v4();

    let first = f
        .orchestrator
        .send_turn(turn(user, None, "hello"))
        .await
        .unwrap();

    let err = f
        .orchestrator
        .send_turn(turn(user, Some(first.conversation_id), "more"))
        .await
        .unwrap_err();
    match err {
        TurnError::UsageLimitExceeded { limit, .. } => assert_eq!(limit, 1),
        other => panic!("expected usage limit error, got {other:?}"),
    }
    // The denied turn never reached the generation provider.
    assert_eq!(generation.call_count(), 1);
}

#[tokio::test]
async fn foreign_conversation_is_not_found() {
    let f = fixture(Arc::new(ScriptedProvider::new("ok")), 50);
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let outcome = f
        .orchestrator
        .send_turn(turn(owner, None, "hello"))
        .await
        .unwrap();

    let err = f
        .orchestrator
        .send_turn(turn(stranger, Some(outcome.conversation_id), "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::ConversationNotFound));
}

#[tokio::test]
async fn analysis_is_merged_and_surfaced_when_confident() {
    let analysis = PartialAnalysis {
        biases: vec![Bias {
            name: "Catastrophizing".into(),
            confidence: 0.7,
            description: "expects the worst".into(),
        }],
        insights: vec!["connects mood to sleep".into()],
        ..Default::default()
    };
    let generation = Arc::new(ScriptedProvider::with_analysis("Thanks for sharing.", analysis));
    let f = fixture(generation, 50);
    let user = Uuid::new_v4();

    // Drive the conversation past the 5-message context floor.
    let first = f
        .orchestrator
        .send_turn(turn(user, None, "hi"))
        .await
        .unwrap();
    let id = first.conversation_id;
    f.orchestrator
        .send_turn(turn(user, Some(id), "still here"))
        .await
        .unwrap();
    let third = f
        .orchestrator
        .send_turn(turn(user, Some(id), "day three"))
        .await
        .unwrap();

    let analysis = third.analysis.expect("confident analysis should surface");
    assert_eq!(analysis.biases[0].name, "Catastrophizing");
    let stored = f
        .orchestrator
        .store()
        .load_analysis(id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.biases.len(), 1);
}

#[tokio::test]
async fn early_turn_analysis_is_stored_without_biases() {
    let analysis = PartialAnalysis {
        biases: vec![Bias {
            name: "Mind reading".into(),
            confidence: 0.9,
            description: String::new(),
        }],
        ..Default::default()
    };
    let generation = Arc::new(ScriptedProvider::with_analysis("Thanks.", analysis));
    let f = fixture(generation, 50);
    let user = Uuid::new_v4();

    // First turn: conversation has 2 messages, below the 5-message floor, so
    // incoming biases are discarded and nothing surfaces.
    let outcome = f
        .orchestrator
        .send_turn(turn(user, None, "hello"))
        .await
        .unwrap();
    assert!(outcome.analysis.is_none());
    let stored = f
        .orchestrator
        .store()
        .load_analysis(outcome.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.biases.is_empty());
}

#[tokio::test]
async fn dying_stream_persists_gated_partial_text() {
    let f = fixture(Arc::new(DyingStreamProvider), 50);
    let user = Uuid::new_v4();
    let mut seen = String::new();

    let outcome = f
        .orchestrator
        .send_turn_streaming(turn(user, None, "hello"), |delta| seen.push_str(delta))
        .await
        .unwrap();

    assert_eq!(seen, "I hear you.");
    assert_eq!(outcome.reply_text, "I hear you.");
    let messages = f
        .orchestrator
        .store()
        .recent_messages(outcome.conversation_id, 10)
        .await
        .unwrap();
    assert_eq!(messages[1].text, "I hear you.");
}
