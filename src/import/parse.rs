//! Total cell parsers. None of these fail: unparsable input is "no value".

use chrono::{NaiveDate, NaiveDateTime};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Trimmed cell text, or None when blank.
pub fn normalize_str(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Fallback formats tried after DD/MM/YYYY and YYYY-MM-DD.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%y",
    "%d %b %Y",
    "%B %d, %Y",
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%d/%m/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in FALLBACK_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(dt.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(t)
        .ok()
        .map(|dt| dt.date_naive())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match fold_diacritics(raw.trim()).to_lowercase().as_str() {
        "s" | "si" | "yes" | "y" | "1" | "true" => Some(true),
        "n" | "no" | "0" | "false" => Some(false),
        _ => None,
    }
}

/// Decimal literal; a lone comma is accepted as the decimal separator.
pub fn parse_float(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let v = match t.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            if t.matches(',').count() != 1 || t.contains('.') {
                return None;
            }
            t.replace(',', ".").parse::<f64>().ok()?
        }
    };
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

/// Float rounded half-up (`floor(x + 0.5)`).
pub fn parse_int(raw: &str) -> Option<i64> {
    let v = parse_float(raw)?;
    let r = (v + 0.5).floor();
    if r < i64::MIN as f64 || r > i64::MAX as f64 {
        return None;
    }
    Some(r as i64)
}

pub fn clamp_attendance(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

pub fn parse_attendance(raw: &str) -> Option<f64> {
    parse_float(raw).map(clamp_attendance)
}

/// Grade in 1..=10 after rounding; anything else is dropped.
pub fn parse_grade(raw: &str) -> Option<u8> {
    let v = parse_int(raw)?;
    if (1..=10).contains(&v) {
        Some(v as u8)
    } else {
        None
    }
}

/// Canonical decomposition with combining marks dropped. Stroked letters
/// have no decomposition and are mapped to their base letter.
pub fn fold_diacritics(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'ł' => 'l',
            'Ł' => 'L',
            'ø' => 'o',
            'Ø' => 'O',
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_first_and_iso_dates_agree() {
        let a = parse_date("30/6/2005");
        let b = parse_date("2005-06-30");
        assert_eq!(a, NaiveDate::from_ymd_opt(2005, 6, 30));
        assert_eq!(a, b);
        assert_eq!(parse_date("15/05/2005"), NaiveDate::from_ymd_opt(2005, 5, 15));
    }

    #[test]
    fn garbage_dates_are_no_value() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("31/02/2005"), None);
    }

    #[test]
    fn fallback_formats_cover_month_first_and_timestamps() {
        assert_eq!(parse_date("6/30/2005"), NaiveDate::from_ymd_opt(2005, 6, 30));
        assert_eq!(
            parse_date("2005-06-30T10:00:00"),
            NaiveDate::from_ymd_opt(2005, 6, 30)
        );
        assert_eq!(parse_date("30-06-2005"), NaiveDate::from_ymd_opt(2005, 6, 30));
    }

    #[test]
    fn boolean_sets() {
        for v in ["S", "Si", "YES", "1", "true", "y", "Sí"] {
            assert_eq!(parse_bool(v), Some(true), "{}", v);
        }
        for v in ["N", "No", "0", "FALSE"] {
            assert_eq!(parse_bool(v), Some(false), "{}", v);
        }
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn integers_round_half_up() {
        assert_eq!(parse_int("8.5"), Some(9));
        assert_eq!(parse_int("7"), Some(7));
        assert_eq!(parse_int("7.49"), Some(7));
        assert_eq!(parse_int("-0.5"), Some(0));
        assert_eq!(parse_int("abc"), None);
    }

    #[test]
    fn floats_reject_non_finite_and_accept_decimal_comma() {
        assert_eq!(parse_float("75.5"), Some(75.5));
        assert_eq!(parse_float("75,5"), Some(75.5));
        assert_eq!(parse_float("NaN"), None);
        assert_eq!(parse_float("inf"), None);
        assert_eq!(parse_float("1,2,3"), None);
    }

    #[test]
    fn grades_outside_range_are_dropped() {
        assert_eq!(parse_grade("8.5"), Some(9));
        assert_eq!(parse_grade("7"), Some(7));
        assert_eq!(parse_grade("10.6"), None);
        assert_eq!(parse_grade("0.4"), None);
        assert_eq!(parse_grade("11"), None);
    }

    #[test]
    fn attendance_clamps() {
        assert_eq!(parse_attendance("150"), Some(100.0));
        assert_eq!(parse_attendance("-3"), Some(0.0));
        assert_eq!(parse_attendance("82.5"), Some(82.5));
    }

    #[test]
    fn normalize_treats_blank_as_absent() {
        assert_eq!(normalize_str("   "), None);
        assert_eq!(normalize_str("  Ana "), Some("Ana".to_string()));
    }

    #[test]
    fn fold_strips_accents_beyond_spanish() {
        assert_eq!(fold_diacritics("José Núñez"), "Jose Nunez");
        assert_eq!(fold_diacritics("Šárka Dvořáková"), "Sarka Dvorakova");
        assert_eq!(fold_diacritics("Łukasz Żółć"), "Lukasz Zolc");
        assert_eq!(fold_diacritics("Ørsted Ğülşen"), "Orsted Gulsen");
    }

    #[test]
    fn accented_affirmative_parses() {
        assert_eq!(parse_bool("Sí"), Some(true));
        assert_eq!(parse_bool(" SÍ "), Some(true));
    }
}
