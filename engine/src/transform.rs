//! Built-in field type rules.
//!
//! Decoding turns a storage representation into the in-memory value held
//! by an entity; encoding prepares an in-memory value for the query store.
//! The two directions are not inverses for every type: `integer` and
//! `enum` have no encode step, and `set` decodes an empty string into a
//! single empty element.

use crate::codec::{CodecRegistry, Direction};
use crate::{error::Result, Error, FieldSchema, FieldType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Transform `value` according to `field`.
pub(crate) fn apply(
    field: &FieldSchema,
    value: Value,
    direction: Direction,
    codecs: &CodecRegistry,
    datetime_format: &str,
) -> Result<Value> {
    if let Some(transform) = &field.transform {
        return transform.call(value, direction);
    }

    match (&field.field_type, direction) {
        (FieldType::Integer, Direction::Decode) => Ok(Value::Int(to_integer(&value))),
        (FieldType::DateTime, Direction::Decode) => decode_datetime(field, value, datetime_format),
        (FieldType::Timestamp, Direction::Decode) => {
            decode_timestamp(field, value, datetime_format)
        }
        (FieldType::DateTime | FieldType::Timestamp, Direction::Encode) => {
            encode_moment(field, value, datetime_format)
        }
        (FieldType::Money, _) => Ok(Value::Float(round_money(to_float(&value)))),
        (FieldType::Set, Direction::Decode) => Ok(decode_set(value)),
        (FieldType::Set, Direction::Encode) => Ok(encode_set(value)),
        (FieldType::Json, Direction::Decode) => Ok(decode_json(field, value)),
        (FieldType::Json, Direction::Encode) => Ok(Value::Text(value.to_json().to_string())),
        (FieldType::Enum, direction) => check_enum(field, value, direction),
        (FieldType::Boolean, Direction::Decode) => Ok(decode_boolean(field, value)),
        (FieldType::Boolean, Direction::Encode) => {
            Ok(Value::Int(i64::from(is_positive(&value))))
        }
        (FieldType::String, Direction::Decode) => {
            Ok(map_text(value, |s| strip_slashes(&decode_html(s))))
        }
        (FieldType::String, Direction::Encode) => {
            Ok(map_text(value, |s| add_slashes(&encode_html(s))))
        }
        (FieldType::Custom(name), direction) => codecs.execute(name, value, direction),
        (FieldType::Integer | FieldType::Untyped, _) => Ok(value),
    }
}

/// Integer coercion: leading digits of text, truncated floats, 0 otherwise.
pub(crate) fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => i64::from(*b),
        Value::Text(s) => parse_leading_int(s),
        Value::List(items) => i64::from(!items.is_empty()),
        Value::DateTime(dt) => dt.timestamp(),
        _ => 0,
    }
}

fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut n: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(b - b'0');
        n = n
            .saturating_mul(10)
            .saturating_add(if negative { -digit } else { digit });
    }
    n
}

/// Float coercion: leading numeric prefix of text, 0.0 otherwise.
pub(crate) fn to_float(value: &Value) -> f64 {
    match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Text(s) => parse_leading_float(s),
        _ => 0.0,
    }
}

fn parse_leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            end = frac_end;
            has_digits = true;
        }
    }
    if !has_digits {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(0.0)
}

/// Round half away from zero to two decimals on the binary value, so
/// `1.005` (stored as 1.00499...) rounds down to `1.0`.
pub(crate) fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn parse_datetime(text: &str, format: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_epoch(field: &FieldSchema, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| Error::InvalidValue {
        field: field.name.clone(),
        reason: format!("epoch {secs} is out of range"),
    })
}

fn unparsable(field: &FieldSchema, value: &Value) -> Error {
    Error::InvalidValue {
        field: field.name.clone(),
        reason: format!("cannot read '{}' ({}) as a date-time", value.render(), value.type_name()),
    }
}

fn decode_moment(field: &FieldSchema, value: &Value, format: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) if s.trim().is_empty() => Ok(None),
        Value::Text(s) => parse_datetime(s, format)
            .map(Some)
            .ok_or_else(|| unparsable(field, value)),
        Value::DateTime(dt) => Ok(Some(*dt)),
        Value::Int(secs) => from_epoch(field, *secs).map(Some),
        Value::Float(secs) => from_epoch(field, *secs as i64).map(Some),
        other => Err(unparsable(field, other)),
    }
}

fn decode_datetime(field: &FieldSchema, value: Value, format: &str) -> Result<Value> {
    Ok(decode_moment(field, &value, format)?
        .map(Value::DateTime)
        .unwrap_or(Value::Null))
}

fn decode_timestamp(field: &FieldSchema, value: Value, format: &str) -> Result<Value> {
    if let Value::Int(_) = value {
        return Ok(value);
    }
    Ok(decode_moment(field, &value, format)?
        .map(|dt| Value::Int(dt.timestamp()))
        .unwrap_or(Value::Null))
}

fn encode_moment(field: &FieldSchema, value: Value, format: &str) -> Result<Value> {
    let moment = match &value {
        Value::Text(s) if !s.trim().is_empty() && s.trim().bytes().all(|b| b.is_ascii_digit()) => {
            Some(from_epoch(field, parse_leading_int(s))?)
        }
        other => decode_moment(field, other, format)?,
    };
    Ok(moment
        .map(|dt| Value::Text(dt.format(format).to_string()))
        .unwrap_or(Value::Null))
}

fn decode_set(value: Value) -> Value {
    match value {
        Value::Null | Value::List(_) => value,
        other => Value::List(
            other
                .render()
                .split(',')
                .map(|item| Value::Text(item.to_string()))
                .collect(),
        ),
    }
}

fn encode_set(value: Value) -> Value {
    match value {
        Value::List(_) => Value::Text(value.render()),
        other => other,
    }
}

/// Decoded JSON takes the shape of `Value::from(serde_json::Value)`:
/// objects stay `Json`, scalars and arrays become plain values.
fn decode_json(field: &FieldSchema, value: Value) -> Value {
    match value {
        Value::Text(text) if text.trim().is_empty() => Value::Null,
        Value::Text(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Value::from(json),
            Err(e) => {
                tracing::warn!(field = %field.name, error = %e, "discarding malformed JSON");
                Value::Null
            }
        },
        other => Value::from(other.to_json()),
    }
}

fn check_enum(field: &FieldSchema, value: Value, direction: Direction) -> Result<Value> {
    if field.enum_values.is_empty() {
        return Err(Error::InvalidEnumConfig(field.name.clone()));
    }
    if direction == Direction::Encode {
        return Ok(value);
    }
    let allowed = field
        .enum_values
        .iter()
        .any(|candidate| crate::value::loose_eq(candidate, &value));
    Ok(if allowed { value } else { Value::Null })
}

const TRUE_TOKENS: [&str; 6] = ["Y", "1", "true", "TRUE", "YES", "yes"];

fn decode_boolean(field: &FieldSchema, value: Value) -> Value {
    let matched = match &value {
        Value::Text(s) => TRUE_TOKENS.contains(&s.as_str()),
        Value::Int(1) => true,
        _ => false,
    };
    if matched {
        return Value::Bool(true);
    }
    field
        .default
        .clone()
        .filter(Value::is_truthy)
        .unwrap_or(Value::Bool(false))
}

fn is_positive(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i > 0,
        Value::Float(f) => *f > 0.0,
        Value::Text(s) => s == "true" || parse_leading_float(s) > 0.0,
        _ => false,
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

/// Escape the five HTML special characters.
pub(crate) fn encode_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

const HTML_ENTITIES: [(&str, char); 7] = [
    ("&amp;", '&'),
    ("&quot;", '"'),
    ("&#039;", '\''),
    ("&#39;", '\''),
    ("&#x27;", '\''),
    ("&lt;", '<'),
    ("&gt;", '>'),
];

/// Reverse [`encode_html`]. Unknown entities are kept verbatim.
pub(crate) fn decode_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match HTML_ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
        {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Backslash-escape quotes, backslashes and NUL.
pub(crate) fn add_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`add_slashes`]: drop escaping backslashes, `\0` becomes NUL.
pub(crate) fn strip_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some(escaped) => out.push(escaped),
            None => {}
        }
    }
    out
}
