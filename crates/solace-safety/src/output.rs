use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::{Regex, RegexSet};
use solace_schema::{RiskLevel, SafetyVerdict};

use crate::pattern::PatternClassifier;

/// Replies that appear to endorse or instruct self-harm.
const HARMFUL_REPLY_PATTERNS: &[&str] = &[
    r"(?i)\byou should (?:kill|hurt|harm) yourself\b",
    r"(?i)\b(?:here(?:'s| is) how|ways|instructions) to (?:kill yourself|end your life|hurt yourself|overdose)\b",
    r"(?i)\b(?:go ahead and|just) (?:end it|kill yourself|do it then)\b",
    r"(?i)\byou(?:'d| would) be better off dead\b",
    r"(?i)\b(?:the world|everyone) (?:would be|is) better off without you\b",
    r"(?i)\bno one would (?:miss|even notice) you\b",
];

const DIRECTIVE_PATTERN: &str = r"(?i)\byou (?:should|must|need to|have to|ought to)\b";

/// A crisis-level user message must be answered with crisis resources; any
/// of these markers in the reply satisfies that rule.
const CRISIS_RESOURCE_MARKERS: &[&str] = &["988", "741741", "crisis", "hotline", "emergency", "911"];

pub const HARMFUL_CONTENT_FLAG: &str = "HARMFUL_CONTENT";
pub const MISSING_CRISIS_RESPONSE_FLAG: &str = "MISSING_CRISIS_RESPONSE";
pub const OVERLY_DIRECTIVE_FLAG: &str = "OVERLY_DIRECTIVE";

#[derive(Debug, Clone)]
pub struct OutputGateConfig {
    /// Prescriptive phrasings tolerated before the advisory flag fires.
    pub max_directives: usize,
}

impl Default for OutputGateConfig {
    fn default() -> Self {
        Self { max_directives: 3 }
    }
}

/// Gate for generated replies, independent of the input gate. Three rules
/// evaluated independently; flags accumulate and the level is the max over
/// fired rules. An unsafe verdict means the orchestrator must discard the
/// generated reply; it is never an error.
pub struct OutputSafetyGate {
    classifier: Arc<PatternClassifier>,
    harmful: RegexSet,
    directive: Regex,
    config: OutputGateConfig,
}

impl OutputSafetyGate {
    pub fn new(classifier: Arc<PatternClassifier>, config: OutputGateConfig) -> Result<Self> {
        Ok(Self {
            classifier,
            harmful: RegexSet::new(HARMFUL_REPLY_PATTERNS)
                .context("invalid harmful-reply pattern set")?,
            directive: Regex::new(DIRECTIVE_PATTERN).context("invalid directive pattern")?,
            config,
        })
    }

    pub fn check(&self, reply: &str, original_user_text: &str) -> SafetyVerdict {
        let mut level = RiskLevel::None;
        let mut flags = BTreeSet::new();
        let mut recommendations = BTreeSet::new();

        if self.harmful.is_match(reply) {
            level = level.max(RiskLevel::Crisis);
            flags.insert(HARMFUL_CONTENT_FLAG.to_string());
        }

        let input_verdict = self.classifier.classify(original_user_text);
        if input_verdict.level == RiskLevel::Crisis && !contains_crisis_resources(reply) {
            level = level.max(RiskLevel::High);
            flags.insert(MISSING_CRISIS_RESPONSE_FLAG.to_string());
            recommendations.insert("APPEND_CRISIS_RESOURCES".to_string());
        }

        let directives = self.directive.find_iter(reply).count();
        if directives > self.config.max_directives {
            // Advisory only: never raises the level beyond Moderate.
            level = level.max(RiskLevel::Moderate);
            flags.insert(OVERLY_DIRECTIVE_FLAG.to_string());
            recommendations.insert("SOFTEN_DIRECTIVE_TONE".to_string());
        }

        SafetyVerdict::from_level(level, flags, recommendations)
    }
}

fn contains_crisis_resources(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    CRISIS_RESOURCE_MARKERS.iter().any(|m| lower.contains(m))
}
