use solace_schema::SafetyVerdict;

/// Merge two verdicts: level is the maximum under the total order, flags and
/// recommendations are unions. `safe` and `requires_intervention` are
/// re-derived from the combined level rather than copied from either input,
/// so the verdict invariant cannot be smuggled past the constructor.
pub fn combine(a: &SafetyVerdict, b: &SafetyVerdict) -> SafetyVerdict {
    let level = a.level.max(b.level);
    let flags = a.flags.union(&b.flags).cloned().collect();
    let recommendations = a
        .recommendations
        .union(&b.recommendations)
        .cloned()
        .collect();
    SafetyVerdict::from_level(level, flags, recommendations)
}
