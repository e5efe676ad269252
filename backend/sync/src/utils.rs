use std::sync::LazyLock;

use regex::Regex;

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_\s]+").unwrap());
static SYMBOLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Url-safe handle: lowercase, words joined by `-`, anything else dropped.
pub fn clean_handle(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let dashed = SEPARATORS.replace_all(&lower, "-");
    let stripped = SYMBOLS.replace_all(&dashed, "");

    DASHES
        .replace_all(&stripped, "-")
        .trim_matches('-')
        .to_string()
}
