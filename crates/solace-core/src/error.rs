use chrono::{DateTime, Utc};

/// Typed turn outcomes callers pattern-match on. Classification failures
/// never appear here (absorbed by fail-open) and unsafe generated output
/// never appears here (handled by substitution).
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message limit of {limit} reached, resets at {resets_at}")]
    UsageLimitExceeded {
        limit: i64,
        resets_at: DateTime<Utc>,
    },

    #[error("conversation not found")]
    ConversationNotFound,

    /// The external generation call failed or timed out. An apology message
    /// has already been persisted; the caller may retry.
    #[error("generation service unavailable: {source}")]
    GenerationUnavailable {
        #[source]
        source: anyhow::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl TurnError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_failures_are_retryable() {
        let err = TurnError::GenerationUnavailable {
            source: anyhow::anyhow!("boom"),
        };
        assert!(err.is_retryable());
        assert!(!TurnError::ConversationNotFound.is_retryable());
        assert!(!TurnError::UsageLimitExceeded {
            limit: 10,
            resets_at: Utc::now(),
        }
        .is_retryable());
    }

    #[test]
    fn messages_carry_limit_details() {
        let err = TurnError::UsageLimitExceeded {
            limit: 25,
            resets_at: Utc::now(),
        };
        assert!(err.to_string().contains("25"));
    }
}
