use std::sync::Arc;

use solace_provider::ModerationKind;
use solace_schema::{ConversationContext, RiskLevel, SafetyVerdict};

use crate::combine::combine;
use crate::pattern::PatternClassifier;
use crate::remote::RemoteSafetyClassifier;

/// Gate for inbound user messages: pattern classifier first, remote
/// moderation second, combined verdict out.
///
/// A crisis pattern match returns immediately without issuing the remote
/// call: crisis response latency must never depend on an external network
/// round-trip, and the cheap local signal gates the expensive path.
pub struct InputSafetyGate {
    pattern: Arc<PatternClassifier>,
    remote: RemoteSafetyClassifier,
}

impl InputSafetyGate {
    pub fn new(pattern: Arc<PatternClassifier>, remote: RemoteSafetyClassifier) -> Self {
        Self { pattern, remote }
    }

    pub async fn check(&self, text: &str, context: &ConversationContext) -> SafetyVerdict {
        let pattern_verdict = self.pattern.classify(text);
        if pattern_verdict.level == RiskLevel::Crisis {
            tracing::warn!(
                conversation_id = %context.conversation_id,
                flags = ?pattern_verdict.flags,
                "crisis pattern match, skipping remote moderation"
            );
            return pattern_verdict;
        }

        let remote_verdict = self.remote.classify(text, ModerationKind::UserInput).await;
        tracing::debug!(
            conversation_id = %context.conversation_id,
            pattern_level = pattern_verdict.level.as_str(),
            remote_level = remote_verdict.level.as_str(),
            "input safety check combined"
        );
        combine(&pattern_verdict, &remote_verdict)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use solace_provider::{ModerationOutcome, ModerationProvider, ModerationSeverity};
    use uuid::Uuid;

    use super::*;
    use crate::remote::CHECK_FAILED_FLAG;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        outcome: ModerationOutcome,
    }

    #[async_trait]
    impl ModerationProvider for CountingProvider {
        async fn moderate(&self, _text: &str, _kind: ModerationKind) -> Result<ModerationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    struct ErroringProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModerationProvider for ErroringProvider {
        async fn moderate(&self, _text: &str, _kind: ModerationKind) -> Result<ModerationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("transport error")
        }
    }

    fn context() -> ConversationContext {
        ConversationContext {
            user_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            recent_messages: vec![],
            message_count: 1,
        }
    }

    fn gate_with(provider: Arc<dyn ModerationProvider>) -> InputSafetyGate {
        InputSafetyGate::new(
            Arc::new(PatternClassifier::new().unwrap()),
            RemoteSafetyClassifier::new(provider, Duration::from_secs(3)),
        )
    }

    #[tokio::test]
    async fn crisis_pattern_never_invokes_remote() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = gate_with(Arc::new(CountingProvider {
            calls: calls.clone(),
            outcome: ModerationOutcome {
                flagged: false,
                categories: vec![],
                severity: ModerationSeverity::None,
            },
        }));

        let verdict = gate
            .check("I'm going to kill myself tonight", &context())
            .await;
        assert_eq!(verdict.level, RiskLevel::Crisis);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_crisis_input_combines_with_remote() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = gate_with(Arc::new(CountingProvider {
            calls: calls.clone(),
            outcome: ModerationOutcome {
                flagged: true,
                categories: vec!["harassment".into()],
                severity: ModerationSeverity::Medium,
            },
        }));

        let verdict = gate.check("I had an okay day", &context()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(verdict.level, RiskLevel::Moderate);
        assert!(verdict.has_flag("MODERATION_HARASSMENT"));
    }

    #[tokio::test]
    async fn remote_failure_degrades_to_flagged_low() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = gate_with(Arc::new(ErroringProvider {
            calls: calls.clone(),
        }));

        let verdict = gate.check("I had an okay day", &context()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(verdict.safe);
        assert_eq!(verdict.level, RiskLevel::Low);
        assert!(verdict.has_flag(CHECK_FAILED_FLAG));
    }

    #[tokio::test]
    async fn pattern_level_survives_remote_failure() {
        // High-risk pattern match plus a failing remote check: the combined
        // verdict keeps the High level, with the failure flagged alongside.
        let gate = gate_with(Arc::new(ErroringProvider {
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let verdict = gate.check("sometimes I just want to die", &context()).await;
        assert_eq!(verdict.level, RiskLevel::High);
        assert!(verdict.has_flag("PASSIVE_SUICIDAL_IDEATION"));
        assert!(verdict.has_flag(CHECK_FAILED_FLAG));
    }
}
