//! R$ value extraction from raw text fragments
//!
//! Indicator pages frequently print the R$ and US$ quotes side by side, so the
//! excluded-currency check runs before any numeric match.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker of the currency we collect
pub const TARGET_MARKER: &str = "R$";

/// Marker of the currency we must ignore
pub const EXCLUDED_MARKER: &str = "US$";

/// Broad band that rejects stray captures before per-commodity validation
pub const SANITY_MIN: f64 = 5.0;
pub const SANITY_MAX: f64 = 2000.0;

// The leading class stands in for a lookbehind: a numeral must not continue a
// longer digit run, otherwise "12.345.678,90" would leak "678,90".

/// `1.234,56` style: dot groups, comma decimals, exactly two decimal digits
static GROUPED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d.,])(\d{1,3}(?:\.\d{3})+,\d{2})\b").expect("grouped pattern is valid")
});

/// `123,45` style: 2 to 4 integer digits, comma, two decimal digits
static UNGROUPED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d.,])(\d{2,4},\d{2})\b").expect("ungrouped pattern is valid")
});

/// Case-insensitive check for the excluded-currency marker
#[must_use]
pub fn contains_excluded_marker(text: &str) -> bool {
    text.to_uppercase().contains(EXCLUDED_MARKER)
}

/// True when the fragment mentions R$ and not US$
#[must_use]
pub fn is_target_currency_label(text: &str) -> bool {
    let upper = text.to_uppercase();
    upper.contains(TARGET_MARKER) && !upper.contains(EXCLUDED_MARKER)
}

#[must_use]
pub fn within_sanity_band(value: f64) -> bool {
    (SANITY_MIN..=SANITY_MAX).contains(&value)
}

/// Find a single R$ value in a text fragment.
///
/// Returns `None` when the fragment shows a US$ marker, when neither pattern
/// matches, or when every match falls outside the sanity band.
#[must_use]
pub fn extract(text: &str) -> Option<f64> {
    if contains_excluded_marker(text) {
        return None;
    }
    scan_patterns(text)
}

/// Run both value patterns over arbitrary text, ignoring currency markers.
///
/// Only the first match of each pattern is judged; an out-of-band first match
/// hands over to the next pattern. Used on whole-page text where a US$ figure
/// somewhere on the page must not veto the search.
#[must_use]
pub fn scan_patterns(text: &str) -> Option<f64> {
    [&*GROUPED_PATTERN, &*UNGROUPED_PATTERN]
        .into_iter()
        .find_map(|pattern| {
            pattern
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_numeral(m.as_str()))
                .filter(|value| within_sanity_band(*value))
        })
}

/// Normalize a locale-formatted numeral and parse it.
///
/// Both separators: dot is grouping, comma is decimal. Comma only: decimal when
/// exactly two digits follow it, grouping otherwise.
#[must_use]
pub fn parse_numeral(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');

    let normalized = if has_comma && has_dot {
        cleaned.replace('.', "").replace(',', ".")
    } else if has_comma {
        let decimals = cleaned.rsplit(',').next().map_or(0, str::len);
        if decimals == 2 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    normalized.parse::<f64>().ok()
}
