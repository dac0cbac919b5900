use serde::{Deserialize, Serialize};
use solace_schema::{AnalysisRecord, PartialAnalysis, ThinkingPattern};

/// A merged analysis is surfaced to the user only when at least one bias
/// clears this confidence floor; below it the turn's displayed analysis is
/// suppressed while the stored record keeps accumulating.
pub const SURFACE_CONFIDENCE_FLOOR: f32 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Below this many conversation messages, incoming biases/insights are
    /// discarded as under-contextualized. Emotional state still updates.
    pub min_context_messages: usize,
    pub max_biases: usize,
    pub max_insights: usize,
    /// Length of the prefix used for near-duplicate insight detection.
    pub insight_prefix_len: usize,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            min_context_messages: 5,
            max_biases: 10,
            max_insights: 20,
            insight_prefix_len: 20,
        }
    }
}

pub struct AnalysisMerger {
    policy: MergePolicy,
}

impl AnalysisMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Fold one turn's partial analysis into the cumulative record.
    /// Append-only with bounding; the existing record is never cleared.
    pub fn merge(
        &self,
        existing: &AnalysisRecord,
        incoming: &PartialAnalysis,
        conversation_message_count: usize,
    ) -> AnalysisRecord {
        let mut merged = existing.clone();

        if let Some(state) = &incoming.emotional_state {
            merged.emotional_state = Some(state.clone());
        }

        if conversation_message_count < self.policy.min_context_messages {
            return merged;
        }

        for bias in &incoming.biases {
            match merged
                .biases
                .iter_mut()
                .find(|b| b.name.eq_ignore_ascii_case(&bias.name))
            {
                Some(existing_bias) => {
                    if bias.confidence > existing_bias.confidence {
                        *existing_bias = bias.clone();
                    }
                }
                None => merged.biases.push(bias.clone()),
            }
        }
        merged
            .biases
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        merged.biases.truncate(self.policy.max_biases);

        for insight in &incoming.insights {
            let duplicate = merged
                .insights
                .iter()
                .any(|known| near_duplicate(known, insight, self.policy.insight_prefix_len));
            if !duplicate {
                merged.insights.push(insight.clone());
            }
        }
        if merged.insights.len() > self.policy.max_insights {
            let excess = merged.insights.len() - self.policy.max_insights;
            merged.insights.drain(..excess);
        }

        if !incoming.patterns.is_empty() {
            merged.patterns = incoming.patterns.clone();
        }

        merged
    }
}

/// Two insights are near-duplicates when either contains the other's first
/// `prefix_len` characters, case-insensitively. A heuristic carried over
/// as-is; the constant is policy, not code.
fn near_duplicate(a: &str, b: &str, prefix_len: usize) -> bool {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_prefix: String = a_lower.chars().take(prefix_len).collect();
    let b_prefix: String = b_lower.chars().take(prefix_len).collect();
    a_lower.contains(&b_prefix) || b_lower.contains(&a_prefix)
}

pub fn should_surface(record: &AnalysisRecord) -> bool {
    record
        .biases
        .iter()
        .any(|b| b.confidence >= SURFACE_CONFIDENCE_FLOOR)
}

/// Pattern percentages must sum to 100; the merger does not repair this, so
/// the orchestrator validates before merging.
pub fn patterns_sum_valid(patterns: &[ThinkingPattern]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let sum: f32 = patterns.iter().map(|p| p.percentage).sum();
    (sum - 100.0).abs() < 0.5
}
