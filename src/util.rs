// Utility helpers for parsing, business-day arithmetic and basic statistics.
//
// This module centralizes all the "dirty" spreadsheet cell handling so the
// rest of the code can assume clean, typed values.
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Trims whitespace and drops digit-group spaces (`1 200`).
/// - A value without `.` whose only `,` is followed by one or two digits
///   uses the comma as decimal point (`150,75`, `1 200,50`).
/// - Any other `,` is a thousands separator (`1,234.50`, `1,234`).
/// - Rejects values that contain alphabetic characters.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let s = if is_decimal_comma(&s) {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    };
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_decimal_comma(s: &str) -> bool {
    if s.contains('.') || s.matches(',').count() != 1 {
        return false;
    }
    s.rsplit_once(',').is_some_and(|(_, frac)| {
        (1..=2).contains(&frac.len()) && frac.chars().all(|c| c.is_ascii_digit())
    })
}

/// Parse a calendar date, dropping any time-of-day component.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

/// Number of weekdays in `[start, end)`. Negated when `end` precedes `start`.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return -business_days_between(end, start);
    }
    let days = (end - start).num_days();
    let mut count = (days / 7) * 5;
    let mut weekday = start.weekday().num_days_from_monday();
    for _ in 0..days % 7 {
        if weekday < 5 {
            count += 1;
        }
        weekday = (weekday + 1) % 7;
    }
    count
}

pub fn average(v: &[f64]) -> f64 {
    // Returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed number of decimals plus locale-aware thousands separators
    // (e.g. `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

pub fn format_percent(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

/// Horizontal text bar, `width` characters for a proportion of 1.0.
pub fn text_bar(proportion: f64, width: usize) -> String {
    let p = if proportion.is_finite() {
        proportion.clamp(0.0, 1.0)
    } else {
        0.0
    };
    "#".repeat((p * width as f64).round() as usize)
}
