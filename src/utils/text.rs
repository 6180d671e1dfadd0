/// Strip everything outside printable ASCII from an engineering-unit string.
///
/// GenConfig exports carry glyphs such as the degree sign in whatever code
/// page the tool ran under, so they are dropped rather than translated:
/// `"°C"` becomes `"C"`. Surrounding whitespace is trimmed afterwards.
pub fn sanitize_unit(raw: &str) -> String {
    let kept: String = raw.chars().filter(|c| (' '..='~').contains(c)).collect();
    kept.trim().to_string()
}

/// True for separator lines made of a single repeated rule character.
pub(crate) fn is_rule_line(line: &str, rule: char) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == rule)
}
