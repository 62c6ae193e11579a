use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M",
];

/// A typed value held by a [`crate::frame::Frame`] row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Cell {
    Missing,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    /// Builds a cell from a decoded CSV field; empty fields are `Missing`.
    pub fn from_raw(value: &str) -> Self {
        if value.is_empty() {
            Cell::Missing
        } else {
            Cell::Text(value.to_string())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Date(d) => format_date(*d),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// True for values that a source uses to mean "no value".
pub fn is_null_token(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "na" | "n/a" | "nan" | "null" | "none" | "-" | "#n/a"
    )
}

/// Parses a date with the caller's formats first, then the built-in ones.
/// Ambiguous slash dates read month first (`03/04/2021` is 4 March) unless a
/// configured format says otherwise.
pub fn parse_naive_date(value: &str, extra_formats: &[String]) -> Result<NaiveDate> {
    let trimmed = value.trim();
    for fmt in extra_formats {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.date());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_number(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    let parsed: f64 = trimmed
        .parse()
        .map_err(|_| anyhow!("Failed to parse '{value}' as number"))?;
    if !parsed.is_finite() {
        return Err(anyhow!("'{value}' is not a finite number"));
    }
    Ok(parsed)
}

/// Integral values render without a fractional part so `20.0` and `20` agree.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn format_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_naive_date_supports_multiple_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 2, 15).unwrap();
        assert_eq!(parse_naive_date("2020-02-15", &[]).unwrap(), expected);
        assert_eq!(parse_naive_date("2020-2-15", &[]).unwrap(), expected);
        assert_eq!(parse_naive_date("15/02/2020", &[]).unwrap(), expected);
        assert_eq!(parse_naive_date("02/15/2020", &[]).unwrap(), expected);
        assert_eq!(
            parse_naive_date("03/04/2021", &[]).unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()
        );
        assert_eq!(parse_naive_date("2020/02/15", &[]).unwrap(), expected);
        assert_eq!(parse_naive_date("2020-02-15 08:30:00", &[]).unwrap(), expected);
        assert!(parse_naive_date("not-a-date", &[]).is_err());
    }

    #[test]
    fn parse_naive_date_prefers_configured_formats() {
        let formats = vec!["%d/%m/%Y".to_string()];
        let parsed = parse_naive_date("03/04/2021", &formats).unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2021, 4, 3).unwrap());
    }

    #[test]
    fn null_tokens_cover_common_placeholders() {
        for token in ["", "  ", "NA", "n/a", "NaN", "null", "None", "-", "#N/A"] {
            assert!(is_null_token(token), "{token:?} should be null");
        }
        assert!(!is_null_token("0"));
        assert!(!is_null_token("12"));
    }

    #[test]
    fn numbers_render_stably() {
        assert_eq!(format_number(20.0), "20");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(parse_number(" 42 ").unwrap(), 42.0);
        assert!(parse_number("12abc").is_err());
        assert!(parse_number("inf").is_err());
    }

    #[test]
    fn cells_display_canonical_forms() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
        assert_eq!(Cell::Date(date).to_string(), "2020-01-05");
        assert_eq!(Cell::Number(18.0).to_string(), "18");
        assert_eq!(Cell::Missing.to_string(), "");
        assert_eq!(Cell::from_raw(""), Cell::Missing);
    }
}
