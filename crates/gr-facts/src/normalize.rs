//! Value normalization
//!
//! Both source facts and generated claims pass through the same
//! functions, so equality of normalized forms is the only comparison the
//! grounding layer ever needs.

use chrono::NaiveDate;

/// Canonical string form of a finite number
///
/// Uses the shortest round-trip decimal rendering, which never has
/// trailing fractional zeros or an exponent. Negative zero maps to `0`.
#[must_use]
pub fn canonical_number(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let value = if value == 0.0 { 0.0 } else { value };
    Some(format!("{value}"))
}

/// Parse a numeric token with thousands-separator and decimal tolerance
///
/// Accepts `1,000`, `1_000`, `1 000`, `+12.50`, `0012`. Returns the
/// canonical form, or `None` when the token is not a plain number.
#[must_use]
pub fn normalize_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut cleaned = String::with_capacity(trimmed.len());
    let mut seen_digit = false;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                cleaned.push(c);
            }
            '.' | '-' => cleaned.push(c),
            '\u{2212}' => cleaned.push('-'),
            ',' | '_' | ' ' | '\u{a0}' | '\u{202f}' | '\u{2009}' if seen_digit => {}
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    cleaned.parse::<f64>().ok().and_then(canonical_number)
}

/// Split a trailing percent sign off a quantity string
///
/// `"35%"` becomes `("35", Some("%"))`.
#[must_use]
pub fn split_percent(raw: &str) -> (&str, Option<&'static str>) {
    let trimmed = raw.trim();
    match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), Some("%")),
        None => (trimmed, None),
    }
}

/// Comparison form of text: trimmed, whitespace collapsed, lower-cased
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// ISO-8601 calendar date
#[must_use]
pub fn normalize_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Comparison form of a unit word
///
/// `percent` and `per cent` fold to `%`.
#[must_use]
pub fn normalize_unit(raw: &str) -> String {
    let folded = normalize_text(raw);
    match folded.as_str() {
        "percent" | "per cent" | "pct" => "%".to_string(),
        _ => folded,
    }
}

/// True if `needle` occurs in `haystack` on word boundaries
///
/// Both sides are expected in normalized (folded) form.
#[must_use]
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(pos, _)| {
        let before_ok = haystack[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[pos + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
