// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and duration parsing.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a duration written as `<n>s`, `<n>m`, `<n>h`, `<n>d` or bare seconds.
///
/// Returns `None` for empty input, unknown units, or overflow.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 60 * 60),
        Some((idx, 'd')) => (&value[..idx], 24 * 60 * 60),
        _ => (value, 1),
    };

    let amount: u64 = digits.trim().parse().ok()?;
    amount.checked_mul(multiplier).map(Duration::from_secs)
}

/// Seconds left until `expires_at`, or zero if it has already passed.
pub fn remaining_lifetime(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}
