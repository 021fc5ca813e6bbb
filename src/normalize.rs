//! Text normalization for email bodies.

/// Lowercase `text` and drop every character that is neither alphanumeric
/// nor whitespace.
///
/// Lowercasing happens first so that multi-character lowercase mappings
/// (e.g. `İ` → `i̇`) are filtered as well.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}
