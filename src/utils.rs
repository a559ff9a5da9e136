//! Small helpers.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MS_PER_DAY: f64 = 86_400_000.0;

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Letters, digits and the separators Yahoo uses (BRK.B, BRK-B, ^SPX).
    RE.get_or_init(|| Regex::new(r"^\^?[A-Z0-9]{1,10}(?:[.\-][A-Z0-9]{1,4})?$").expect("static regex"))
}

pub fn sanitize_symbol(sym: &str) -> String {
    sym.trim().to_uppercase()
}

/// Sanitized symbol, or `None` when it cannot be a ticker.
pub fn valid_symbol(sym: &str) -> Option<String> {
    let s = sanitize_symbol(sym);
    if symbol_re().is_match(&s) {
        Some(s)
    } else {
        None
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Capital slider granularity: $100 steps below $5k, $500 steps above.
pub fn snap_capital(value: f64) -> f64 {
    if value < 5_000.0 {
        (value / 100.0).round() * 100.0
    } else {
        (value / 500.0).round() * 500.0
    }
}

/// Whole days until `timestamp` (unix seconds), rounded up.
pub fn days_until(timestamp: i64, now: DateTime<Utc>) -> i64 {
    let diff_ms = (timestamp as f64) * 1000.0 - now.timestamp_millis() as f64;
    (diff_ms / MS_PER_DAY).ceil() as i64
}
