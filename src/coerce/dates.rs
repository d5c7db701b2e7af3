use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::{ImportError, Result};
use crate::fields::DateStyle;

// Longest token first so the scanner never splits a token in two.
const GO_TOKENS: &[(&str, &str)] = &[
    (".000000000", "%.9f"),
    (".000000", "%.6f"),
    (".000", "%.3f"),
    ("January", "%B"),
    ("Monday", "%A"),
    ("Z07:00", "%:z"),
    ("-07:00", "%:z"),
    ("Z0700", "%z"),
    ("-0700", "%z"),
    ("2006", "%Y"),
    ("Jan", "%b"),
    ("Mon", "%a"),
    ("_2", "%e"),
    ("15", "%H"),
    ("01", "%m"),
    ("02", "%d"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("PM", "%p"),
    ("pm", "%P"),
    ("1", "%-m"),
    ("2", "%-d"),
    ("3", "%-I"),
    ("4", "%-M"),
    ("5", "%-S"),
];

const MS_TOKENS: &[(&str, &str)] = &[
    ("ffffff", "%6f"),
    ("yyyy", "%Y"),
    ("fff", "%3f"),
    ("yy", "%y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("tt", "%p"),
    ("M", "%-m"),
    ("d", "%-d"),
    ("H", "%-H"),
    ("h", "%-I"),
    ("m", "%-M"),
    ("s", "%-S"),
];

const ORACLE_TOKENS: &[(&str, &str)] = &[
    ("MONTH", "%B"),
    ("HH24", "%H"),
    ("HH12", "%I"),
    ("YYYY", "%Y"),
    ("MON", "%b"),
    ("DD", "%d"),
    ("HH", "%I"),
    ("MI", "%M"),
    ("SS", "%S"),
    ("YY", "%y"),
    ("AM", "%p"),
    ("PM", "%p"),
    ("FF", "%6f"),
];

/// Translates a layout in the given dialect into a chrono format string.
/// Unrecognised characters pass through literally, with `%` escaped.
#[must_use]
pub fn translate_layout(style: DateStyle, layout: &str) -> String {
    let tokens = match style {
        DateStyle::Go => GO_TOKENS,
        DateStyle::Ms => MS_TOKENS,
        DateStyle::Oracle => ORACLE_TOKENS,
    };
    let mut out = String::with_capacity(layout.len());
    let mut rest = layout;
    'scan: while !rest.is_empty() {
        for (token, fmt) in tokens {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(fmt);
                rest = tail;
                continue 'scan;
            }
        }
        let Some(c) = rest.chars().next() else { break };
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Parses a cell against a layout, falling back to a date-only reading at
/// midnight and a time-only reading on the epoch date.
///
/// # Errors
/// A coercion error naming the offending value and layout.
pub fn parse_date(cell: &str, style: DateStyle, layout: &str) -> Result<NaiveDateTime> {
    let fmt = translate_layout(style, layout);
    if let Ok(dt) = NaiveDateTime::parse_from_str(cell, &fmt) {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(cell, &fmt)
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(dt);
    }
    if let Ok(time) = NaiveTime::parse_from_str(cell, &fmt)
        && let Some(epoch) = NaiveDate::from_ymd_opt(1970, 1, 1)
    {
        return Ok(epoch.and_time(time));
    }
    Err(ImportError::Coerce {
        value: cell.to_string(),
        ty: "date".to_string(),
        message: format!("does not match layout '{layout}'"),
    })
}
