use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use solace_provider::{ModerationKind, ModerationOutcome, ModerationProvider, ModerationSeverity};
use solace_schema::{RiskLevel, SafetyVerdict};

pub const CHECK_FAILED_FLAG: &str = "CHECK_FAILED";

/// Wraps the external moderation model with a hard deadline. The pattern
/// classifier is the safety backstop; this check only adds nuance, so any
/// failure here fails open with a flagged low-risk verdict instead of
/// blocking the conversation.
pub struct RemoteSafetyClassifier {
    provider: Arc<dyn ModerationProvider>,
    deadline: Duration,
}

impl RemoteSafetyClassifier {
    pub fn new(provider: Arc<dyn ModerationProvider>, deadline: Duration) -> Self {
        Self { provider, deadline }
    }

    pub async fn classify(&self, text: &str, kind: ModerationKind) -> SafetyVerdict {
        match tokio::time::timeout(self.deadline, self.provider.moderate(text, kind)).await {
            Ok(Ok(outcome)) => map_outcome(&outcome),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, kind = kind.as_str(), "moderation check failed, failing open");
                check_failed_verdict()
            }
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    kind = kind.as_str(),
                    "moderation check timed out, failing open"
                );
                check_failed_verdict()
            }
        }
    }
}

fn check_failed_verdict() -> SafetyVerdict {
    SafetyVerdict::from_level(
        RiskLevel::Low,
        BTreeSet::from([CHECK_FAILED_FLAG.to_string()]),
        BTreeSet::new(),
    )
}

/// The remote model never asserts crisis on its own; crisis determination
/// stays with the local pattern backstop.
fn map_outcome(outcome: &ModerationOutcome) -> SafetyVerdict {
    let mut level = match outcome.severity {
        ModerationSeverity::None => RiskLevel::None,
        ModerationSeverity::Low => RiskLevel::Low,
        ModerationSeverity::Medium => RiskLevel::Moderate,
        ModerationSeverity::High => RiskLevel::High,
    };
    if outcome.flagged && level == RiskLevel::None {
        level = RiskLevel::Low;
    }
    let flags = outcome
        .categories
        .iter()
        .map(|c| format!("MODERATION_{}", sanitize_category(c)))
        .collect();
    SafetyVerdict::from_level(level, flags, BTreeSet::new())
}

fn sanitize_category(category: &str) -> String {
    category
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
