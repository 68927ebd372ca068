//! Monetary quantity extraction for conflict detection.
//!
//! Recognizes figures such as `$1.2M`, `800K`, `$1,250,000`, and `3.5B`,
//! normalizing each to a base value (`K` = 10³, `M` = 10⁶, `B` = 10⁹).
//! Tokens that fail to parse are dropped; extraction never errors.
//!
//! A figure must start at a word boundary (or with `$`), so the `4` in
//! `Q4` is not treated as an amount. Percentages are skipped: `15%` is a
//! ratio, not a quantity that can be compared with other figures.

use regex::Regex;
use std::sync::OnceLock;

static QUANTITY_REGEX: OnceLock<Regex> = OnceLock::new();

fn quantity_regex() -> &'static Regex {
    QUANTITY_REGEX.get_or_init(|| {
        Regex::new(
            r"(?:\$|\b)(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?(?:([KkMmBb])\b|(%))?",
        )
        .expect("quantity pattern is a valid regex")
    })
}

/// Multiplier for a magnitude suffix.
fn magnitude(suffix: &str) -> f64 {
    match suffix {
        "K" | "k" => 1e3,
        "M" | "m" => 1e6,
        "B" | "b" => 1e9,
        _ => 1.0,
    }
}

/// Parse a single figure like `"$1.2M"`. Returns `None` if `text` does not
/// begin with a figure.
pub fn parse_quantity(text: &str) -> Option<f64> {
    let caps = quantity_regex().captures(text.trim())?;
    if caps.get(0)?.start() != 0 || caps.get(4).is_some() {
        return None;
    }
    normalize(&caps)
}

/// Extract every figure in `text`, normalized to base units.
pub fn extract_quantities(text: &str) -> Vec<f64> {
    quantity_regex()
        .captures_iter(text)
        .filter(|caps| caps.get(4).is_none())
        .filter_map(|caps| normalize(&caps))
        .collect()
}

fn normalize(caps: &regex::Captures<'_>) -> Option<f64> {
    let integer = caps.get(1)?.as_str().replace(',', "");
    let fraction = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let value: f64 = format!("{}{}", integer, fraction).parse().ok()?;
    let multiplier = caps.get(3).map(|m| magnitude(m.as_str())).unwrap_or(1.0);
    let normalized = value * multiplier;
    normalized.is_finite().then_some(normalized)
}

/// Relative spread `(max - min) / min` of a set of figures.
///
/// Returns `None` with fewer than two figures. When `min` is zero the
/// spread is infinite if any figure is non-zero (a zero-vs-nonzero pair is
/// itself contradictory) and zero otherwise.
pub fn relative_spread(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if min == 0.0 {
        return Some(if max > 0.0 { f64::INFINITY } else { 0.0 });
    }
    Some((max - min) / min)
}
