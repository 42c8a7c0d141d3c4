use similar::TextDiff;

/// Render a unified diff with `a/` and `b/` headers for `label`
pub fn unified_diff(label: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", label), &format!("b/{}", label))
        .to_string()
}
