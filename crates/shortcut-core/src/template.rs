//! Pure string transforms shared by the generators.

use crate::config::ShowWhen;
use crate::protocol::app_state_key;
use regex::Regex;
use std::sync::OnceLock;

/// Canonical application-name placeholder inside phrases.
pub const APP_NAME_TOKEN: &str = "${applicationName}";

/// Swift interpolation the placeholder becomes in `AppShortcut` phrases.
pub const SWIFT_APP_NAME: &str = r"\(.applicationName)";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Turn separator-delimited text into a capitalized-word concatenation.
///
/// Hyphens, underscores and whitespace all separate words; runs of them never
/// produce empty fragments. Characters after the first of each word are kept
/// as written, so `startTimer` becomes `StartTimer`.
pub fn to_symbol_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// Escape text for a double-quoted Swift string literal.
/// Backslash goes first so later escapes are not doubled.
pub fn escape_for_embedded_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

pub fn swift_string_literal(text: &str) -> String {
    format!("\"{}\"", escape_for_embedded_literal(text))
}

/// Prompt used when a parameter value has to be requested from the user.
pub fn default_prompt(title: &str) -> String {
    format!("What {}?", title.to_lowercase())
}

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\$\{(\w+)\}").unwrap())
}

/// Names of `${name}` placeholders in first-occurrence order.
/// Repeats are kept: each occurrence gets its own substitution.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Swift expression comparing an app-state key against `value`.
///
/// Booleans are stored as 1/0, so they compare through `integer(forKey:)`.
pub fn synthesize_equality_condition(state_key: &str, value: &ShowWhen) -> String {
    let key = swift_string_literal(&app_state_key(state_key));
    match value {
        ShowWhen::Bool(b) => {
            format!("defaults.integer(forKey: {key}) == {}", if *b { 1 } else { 0 })
        }
        ShowWhen::Number(n) => format!("defaults.double(forKey: {key}) == {n}"),
        ShowWhen::Text(s) => format!(
            "defaults.string(forKey: {key}) == {}",
            swift_string_literal(s)
        ),
        ShowWhen::Other(_) => format!("defaults.object(forKey: {key}) != nil"),
    }
}

// ---------------------------------------------------------------------------
// Phrases
// ---------------------------------------------------------------------------

/// Make sure a phrase mentions the app name, in canonical `${applicationName}` form.
pub fn normalize_phrase(phrase: &str) -> String {
    let canonical = phrase
        .trim()
        .replace(SWIFT_APP_NAME, "{applicationName}")
        .replace(APP_NAME_TOKEN, "{applicationName}")
        .replace("{applicationName}", APP_NAME_TOKEN);
    if canonical.contains(APP_NAME_TOKEN) {
        canonical
    } else {
        format!("{canonical} in {APP_NAME_TOKEN}")
    }
}

/// Swift literal for a normalized phrase, with the app name interpolated.
pub fn swift_phrase_literal(normalized: &str) -> String {
    let escaped = escape_for_embedded_literal(normalized).replace(APP_NAME_TOKEN, SWIFT_APP_NAME);
    format!("\"{escaped}\"")
}
