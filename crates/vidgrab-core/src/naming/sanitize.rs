//! Filesystem-safe path components for media titles.

/// Longest component we produce, leaving room for an extension within NAME_MAX.
const MAX_COMPONENT: usize = 240;

/// Sanitizes a title for use as one path component.
///
/// - Replaces NUL, `/`, `\`, control characters and `:*?"<>|` with `_`
/// - Collapses runs of whitespace into one space (titles keep their spaces)
/// - Trims leading/trailing spaces and dots
/// - Limits length to 240 bytes on a char boundary
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_space = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
            continue;
        }
        prev_space = false;
        let unsafe_char = c == '\0' || c.is_control() || "/\\:*?\"<>|".contains(c);
        out.push(if unsafe_char { '_' } else { c });
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');
    let mut take = trimmed.len().min(MAX_COMPONENT);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].trim_end().to_string()
}
