use solace_schema::{RiskLevel, SafetyVerdict, TierDecision};

/// Inputs to the tier decision, derived once per message.
#[derive(Debug, Clone, Default)]
pub struct RouteSignals {
    pub message_count: usize,
    pub is_session_end: bool,
    pub requires_deep_analysis: bool,
    pub has_complex_emotional_content: bool,
}

/// Pure, total routing function. Priority order, first match wins:
/// explicit deep-analysis requests, then emotional complexity, then the
/// every-5th-message sampling rule. The modulo rule guarantees periodic
/// deep re-analysis even in long uneventful conversations; message 0 never
/// triggers it.
pub fn route(signals: &RouteSignals) -> TierDecision {
    if signals.is_session_end || signals.requires_deep_analysis {
        return TierDecision::Deep;
    }
    if signals.has_complex_emotional_content {
        return TierDecision::Deep;
    }
    if signals.message_count > 0 && signals.message_count % 5 == 0 {
        return TierDecision::Deep;
    }
    TierDecision::Fast
}

const EMOTIONAL_KEYWORDS: &[&str] = &[
    "overwhelmed",
    "grief",
    "grieving",
    "trauma",
    "panic",
    "hopeless",
    "terrified",
    "ashamed",
    "worthless",
    "guilt",
    "lonely",
    "despair",
    "numb",
];

/// A message carries complex emotional content when the input verdict is at
/// least Moderate or the text is dense with emotional vocabulary.
pub fn has_complex_emotional_content(text: &str, input_verdict: &SafetyVerdict) -> bool {
    if input_verdict.level >= RiskLevel::Moderate {
        return true;
    }
    let lower = text.to_lowercase();
    let hits = EMOTIONAL_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    hits >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(message_count: usize) -> RouteSignals {
        RouteSignals {
            message_count,
            ..Default::default()
        }
    }

    #[test]
    fn every_fifth_message_goes_deep() {
        assert_eq!(route(&signals(5)), TierDecision::Deep);
        assert_eq!(route(&signals(10)), TierDecision::Deep);
        assert_eq!(route(&signals(4)), TierDecision::Fast);
        assert_eq!(route(&signals(6)), TierDecision::Fast);
    }

    #[test]
    fn message_zero_never_triggers_the_modulo_rule() {
        assert_eq!(route(&signals(0)), TierDecision::Fast);
    }

    #[test]
    fn session_end_wins_regardless_of_count() {
        let s = RouteSignals {
            message_count: 1,
            is_session_end: true,
            ..Default::default()
        };
        assert_eq!(route(&s), TierDecision::Deep);
    }

    #[test]
    fn explicit_deep_analysis_request_wins() {
        let s = RouteSignals {
            message_count: 2,
            requires_deep_analysis: true,
            ..Default::default()
        };
        assert_eq!(route(&s), TierDecision::Deep);
    }

    #[test]
    fn emotional_complexity_goes_deep() {
        let s = RouteSignals {
            message_count: 3,
            has_complex_emotional_content: true,
            ..Default::default()
        };
        assert_eq!(route(&s), TierDecision::Deep);
    }

    #[test]
    fn emotional_content_from_verdict_level() {
        let moderate = SafetyVerdict::from_level(
            solace_schema::RiskLevel::Moderate,
            Default::default(),
            Default::default(),
        );
        assert!(has_complex_emotional_content("whatever", &moderate));
        assert!(!has_complex_emotional_content(
            "I had an okay day",
            &SafetyVerdict::none()
        ));
    }

    #[test]
    fn emotional_content_from_keyword_density() {
        let none = SafetyVerdict::none();
        assert!(has_complex_emotional_content(
            "I feel so overwhelmed and lonely lately",
            &none
        ));
        // One keyword alone is not enough.
        assert!(!has_complex_emotional_content(
            "work has me a bit overwhelmed",
            &none
        ));
    }
}
