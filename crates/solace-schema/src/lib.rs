use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered severity of a detected safety concern.
///
/// The order is load-bearing: combination and escalation logic always take
/// the maximum of two levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Moderate,
    High,
    Crisis,
}

impl RiskLevel {
    /// Explicit severity rank backing the total order. Comparisons go through
    /// this match, not declaration order, so reordering variants cannot
    /// silently change escalation behavior.
    fn severity_rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Moderate => 2,
            Self::High => 3,
            Self::Crisis => 4,
        }
    }

    pub fn requires_intervention(self) -> bool {
        matches!(self, Self::High | Self::Crisis)
    }

    pub fn is_safe(self) -> bool {
        !self.requires_intervention()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Crisis => "crisis",
        }
    }
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity_rank().cmp(&other.severity_rank())
    }
}

/// Result of a safety check over a piece of text.
///
/// Invariants: `requires_intervention == level.requires_intervention()` and
/// `safe == level.is_safe()`. Construct through [`SafetyVerdict::from_level`]
/// so the derived fields cannot drift from the level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub level: RiskLevel,
    pub flags: BTreeSet<String>,
    pub requires_intervention: bool,
    pub recommendations: BTreeSet<String>,
}

impl SafetyVerdict {
    pub fn from_level(
        level: RiskLevel,
        flags: BTreeSet<String>,
        recommendations: BTreeSet<String>,
    ) -> Self {
        Self {
            safe: level.is_safe(),
            level,
            flags,
            requires_intervention: level.requires_intervention(),
            recommendations,
        }
    }

    /// The empty no-risk verdict.
    pub fn none() -> Self {
        Self::from_level(RiskLevel::None, BTreeSet::new(), BTreeSet::new())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
        }
    }
}

/// Read-only view of a conversation handed to the safety gates and the tier
/// router. `recent_messages` is bounded, most-recent-last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub recent_messages: Vec<ChatMessage>,
    pub message_count: usize,
}

/// Generation tier chosen for a single turn. Decided once per message,
/// never mutated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TierDecision {
    Fast,
    Deep,
}

impl TierDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Deep => "deep",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionalState {
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
    pub intensity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bias {
    pub name: String,
    pub confidence: f32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThinkingPattern {
    pub name: String,
    pub percentage: f32,
}

/// Cumulative per-conversation psychological analysis. Owned by a
/// conversation, mutated only through the analysis merger; append-only with
/// bounding, never cleared except by conversation deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    #[serde(default)]
    pub emotional_state: Option<EmotionalState>,
    #[serde(default)]
    pub biases: Vec<Bias>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<ThinkingPattern>,
}

/// Partial analysis produced by a single deep-tier generation, folded into
/// the conversation's [`AnalysisRecord`] by the merger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialAnalysis {
    #[serde(default)]
    pub emotional_state: Option<EmotionalState>,
    #[serde(default)]
    pub biases: Vec<Bias>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<ThinkingPattern>,
}

impl PartialAnalysis {
    pub fn is_empty(&self) -> bool {
        self.emotional_state.is_none()
            && self.biases.is_empty()
            && self.insights.is_empty()
            && self.patterns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub crisis_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One user's usage window. Reset lazily when `now >= period_end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub count: i64,
}

impl UsagePeriod {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.period_end
    }
}
