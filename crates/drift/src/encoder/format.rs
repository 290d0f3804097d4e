//! Value formatting for delimited output.
//!
//! Masks here and the `*_FORMAT` options in the load command must describe
//! the same layout. Text bound for temporal or numeric columns is parsed and
//! rendered again, so the warehouse only ever sees these layouts.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use snafu::prelude::*;

use crate::error::{CoercionError, NonFiniteNumberSnafu, UnparsableTextSnafu};
use crate::mapping::FieldFormat;
use crate::schema::TypeCategory;
use crate::source::Value;

pub const TIMESTAMP_MASK: &str = "%Y-%m-%d %H:%M:%S%.3f";
pub const DATE_MASK: &str = "%Y-%m-%d";
pub const TIME_MASK: &str = "%H:%M:%S%.3f";

/// Warehouse spelling of [`TIMESTAMP_MASK`].
pub const WAREHOUSE_TIMESTAMP_FORMAT: &str = "YYYY-MM-DD HH24:MI:SS.FF3";
/// Warehouse spelling of [`DATE_MASK`].
pub const WAREHOUSE_DATE_FORMAT: &str = "YYYY-MM-DD";
/// Warehouse spelling of [`TIME_MASK`].
pub const WAREHOUSE_TIME_FORMAT: &str = "HH24:MI:SS.FF3";

/// Accepted layouts for timestamp text without an offset. `%.f` also matches
/// no fraction at all.
const TIMESTAMP_INPUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const TIME_INPUTS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Render `value` for a column of `category`. Returns `None` for null.
///
/// Blank text in a non-string column is null.
pub fn format_value(
    value: &Value,
    category: TypeCategory,
    format: &FieldFormat,
) -> Result<Option<Vec<u8>>, CoercionError> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) if category != TypeCategory::String => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            coerce_text(s, category)?
        }
        Value::String(s) => s.clone(),
        Value::Timestamp(ts) => match category {
            TypeCategory::Date => ts.format(DATE_MASK).to_string(),
            TypeCategory::Time => ts.format(TIME_MASK).to_string(),
            _ => ts.format(TIMESTAMP_MASK).to_string(),
        },
        Value::Date(date) => match category {
            TypeCategory::Timestamp => date.and_time(NaiveTime::MIN).format(TIMESTAMP_MASK).to_string(),
            _ => date.format(DATE_MASK).to_string(),
        },
        Value::Time(time) => time.format(TIME_MASK).to_string(),
        Value::Boolean(b) => match (category, b) {
            (TypeCategory::Number, true) => "1".to_string(),
            (TypeCategory::Number, false) => "0".to_string(),
            (_, b) => b.to_string(),
        },
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => {
            ensure!(
                f.is_finite() || category == TypeCategory::String,
                NonFiniteNumberSnafu { value: *f }
            );
            // Display for f64 is the shortest text that parses back to the same value.
            f.to_string()
        }
        Value::Decimal(d) => d.clone(),
    };

    if category != TypeCategory::String {
        return Ok(Some(text.into_bytes()));
    }
    Ok(Some(fit_string(&text, format)))
}

/// Parse text for a typed column and render it in the column's layout.
fn coerce_text(text: &str, category: TypeCategory) -> Result<String, CoercionError> {
    let rendered = match category {
        TypeCategory::Timestamp => parse_timestamp(text).map(|ts| ts.format(TIMESTAMP_MASK).to_string()),
        TypeCategory::Date => parse_date(text).map(|d| d.format(DATE_MASK).to_string()),
        TypeCategory::Time => parse_time(text).map(|t| t.format(TIME_MASK).to_string()),
        TypeCategory::Number => normalize_number(text),
        TypeCategory::String => Some(text.to_string()),
    };
    rendered.context(UnparsableTextSnafu {
        text,
        category: category.as_str(),
    })
}

/// RFC 3339 text is converted to UTC; text without an offset is taken as is.
/// A bare date is midnight.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    TIMESTAMP_INPUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_MASK)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_MASK)
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date()))
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    TIME_INPUTS
        .iter()
        .find_map(|layout| NaiveTime::parse_from_str(text, layout).ok())
        .or_else(|| parse_timestamp(text).map(|ts| ts.time()))
}

/// Plain decimal text is kept digit for digit; anything else must parse as
/// a finite float and is written in plain notation.
fn normalize_number(text: &str) -> Option<String> {
    if is_plain_decimal(text) {
        return Some(text.to_string());
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.to_string())
}

fn is_plain_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(integer) && fraction.is_none_or(all_digits)
}

/// Apply trimming and the byte length limit to a string value.
///
/// Truncation counts bytes, so it can cut through a multi-byte character.
fn fit_string(text: &str, format: &FieldFormat) -> Vec<u8> {
    let mut bytes = format.trim.apply(text).as_bytes().to_vec();
    if let Some(max) = format.max_length {
        if bytes.len() > max {
            bytes.truncate(max);
        } else if format.pad {
            bytes.resize(max, b' ');
        }
    }
    bytes
}
