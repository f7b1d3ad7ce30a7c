/// Filters a recognized fragment down to usable text.
///
/// Collapses whitespace runs and trims, then rejects fragments that are too
/// short (< 2 chars) or dominated by punctuation (more than half of the
/// characters neither alphanumeric nor whitespace). Pure and idempotent;
/// anything rejected comes back as the empty string.
pub fn clean(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let total = collapsed.chars().count();
    if total < 2 {
        return String::new();
    }
    let noise = collapsed
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if noise as f32 / total as f32 > 0.5 {
        return String::new();
    }
    collapsed
}

pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
