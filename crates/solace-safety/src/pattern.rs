use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::RegexSet;
use solace_schema::{RiskLevel, SafetyVerdict};

/// One named rule: a flag plus the pattern set that fires it.
struct Rule {
    flag: &'static str,
    patterns: RegexSet,
}

/// One severity tier: evaluated as a unit, most severe tiers first.
struct RuleTier {
    level: RiskLevel,
    rules: Vec<Rule>,
    recommendations: &'static [&'static str],
}

/// The rule table is data, not control flow: an ordered list of
/// (level, [(flag, patterns)], recommendations) entries. Tiers are evaluated
/// top-down; the first tier with any match decides the level and every
/// matching flag within that tier is recorded, so worst-case severity is
/// never under-reported in a single pass.
#[rustfmt::skip]
const TIER_TABLE: &[(RiskLevel, &[(&str, &[&str])], &[&str])] = &[
    (
        RiskLevel::Crisis,
        &[
            ("SUICIDAL_IDEATION_WITH_INTENT", &[
                r"(?i)\bi\s*(?:'m|am)?\s*(?:going to|gonna|about to)\s+(?:kill myself|end my life|end it all|take my own life)\b",
                r"(?i)\b(?:kill(?:ing)? myself|end(?:ing)? my life|take my own life|commit suicide)\b.{0,40}\b(?:tonight|today|tomorrow|right now|this week)\b",
                r"(?i)\b(?:tonight|today|tomorrow|right now)\b.{0,40}\b(?:kill(?:ing)? myself|end(?:ing)? my life|end it all)\b",
                r"(?i)\b(?:i(?:'ve| have)?\s*decided to)\s+(?:kill myself|end my life|end it all|die)\b",
            ]),
            ("SUICIDE_PLAN_OR_METHOD", &[
                r"(?i)\b(?:have|made|got)\s+a\s+plan\b.{0,60}\b(?:die|kill myself|end my life|suicide)\b",
                r"(?i)\b(?:pills|rope|bridge|gun)\b.{0,60}\b(?:end it all|kill myself|end my life|be over)\b",
                r"(?i)\b(?:overdose)\b.{0,40}\b(?:tonight|today|plan|going to)\b",
            ]),
            ("SELF_HARM_IN_PROGRESS", &[
                r"(?i)\bi\s*(?:'m|am)\s+(?:cutting|hurting|harming)\s+myself\s+(?:right now|now)\b",
                r"(?i)\bjust\s+(?:cut|hurt|harmed)\s+myself\b",
            ]),
        ],
        &["IMMEDIATE_INTERVENTION", "PROVIDE_CRISIS_RESOURCES"],
    ),
    (
        RiskLevel::High,
        &[
            ("PASSIVE_SUICIDAL_IDEATION", &[
                r"(?i)\b(?:want to die|wish i (?:was|were) dead|wish i (?:wasn't|weren't) (?:here|alive))\b",
                r"(?i)\bdon'?t want to (?:be alive|live|exist|wake up)\b",
                r"(?i)\bthink(?:ing)? about (?:suicide|killing myself|ending my life)\b",
                r"(?i)\b(?:everyone|they)(?:'d| would) be better off without me\b",
            ]),
            ("SEVERE_HOPELESSNESS", &[
                r"(?i)\bno (?:reason|point) (?:to|in) (?:live|living|go(?:ing)? on)\b",
                r"(?i)\bnothing (?:will|is going to) ever (?:get better|change)\b",
                r"(?i)\bcan'?t (?:go on|do this anymore|take (?:it|this) anymore)\b",
            ]),
            ("SELF_HARM_IDEATION", &[
                r"(?i)\b(?:want to|urge to|thinking about)\s+(?:hurt(?:ing)?|cut(?:ting)?|harm(?:ing)?)\s+myself\b",
            ]),
        ],
        &["PROVIDE_CRISIS_RESOURCES", "SUGGEST_PROFESSIONAL_SUPPORT"],
    ),
    (
        RiskLevel::Moderate,
        &[
            ("ACUTE_DISTRESS", &[
                r"(?i)\b(?:panic attack|can'?t stop crying|can'?t breathe|falling apart|completely overwhelmed|breaking down)\b",
            ]),
            ("HARMFUL_COPING", &[
                r"(?i)\b(?:drinking|drunk|getting high)\b.{0,40}\b(?:to cope|to numb|to forget|every night)\b",
                r"(?i)\b(?:starv(?:e|ing) myself|haven'?t eaten (?:in|for) days)\b",
            ]),
        ],
        &["SUGGEST_PROFESSIONAL_SUPPORT", "GROUNDING_TECHNIQUES"],
    ),
    (
        RiskLevel::Low,
        &[
            ("NEGATIVE_SELF_TALK", &[
                r"(?i)\b(?:hate myself|i'?m (?:worthless|useless|a failure|a burden))\b",
            ]),
            ("PERSISTENT_LOW_MOOD", &[
                r"(?i)\b(?:hopeless|so depressed|really struggling|numb all the time)\b",
            ]),
        ],
        &["MONITOR_MOOD"],
    ),
];

/// Pure, synchronous risk classifier over a fixed rule table. The local
/// backstop for the whole safety pipeline: it must stay dependency-free and
/// complete in microseconds.
pub struct PatternClassifier {
    tiers: Vec<RuleTier>,
}

impl PatternClassifier {
    pub fn new() -> Result<Self> {
        let mut tiers = Vec::with_capacity(TIER_TABLE.len());
        for &(level, rules, recommendations) in TIER_TABLE {
            let mut compiled = Vec::with_capacity(rules.len());
            for &(flag, patterns) in rules {
                let set = RegexSet::new(patterns)
                    .with_context(|| format!("invalid pattern set for rule {flag}"))?;
                compiled.push(Rule {
                    flag,
                    patterns: set,
                });
            }
            tiers.push(RuleTier {
                level,
                rules: compiled,
                recommendations,
            });
        }
        Ok(Self { tiers })
    }

    /// Walk the tiers top-down. The first tier with any matching rule sets
    /// the verdict level, with every matching flag in that tier recorded;
    /// lower tiers are never consulted, so continuing can't downgrade.
    pub fn classify(&self, text: &str) -> SafetyVerdict {
        for tier in &self.tiers {
            let flags: BTreeSet<String> = tier
                .rules
                .iter()
                .filter(|rule| rule.patterns.is_match(text))
                .map(|rule| rule.flag.to_string())
                .collect();
            if !flags.is_empty() {
                let recommendations = tier
                    .recommendations
                    .iter()
                    .map(|r| r.to_string())
                    .collect();
                return SafetyVerdict::from_level(tier.level, flags, recommendations);
            }
        }
        SafetyVerdict::none()
    }
}
