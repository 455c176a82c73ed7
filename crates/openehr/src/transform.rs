//! JSON template engine used by heading definitions.
//!
//! A template is an ordinary JSON value. While rendering against an input document:
//! - a string that is exactly `"{{a.b.0.c}}"` is replaced by the value at that path (any JSON
//!   type); when the path is missing the key is dropped from the output,
//! - a string containing placeholders among other text is interpolated as text, missing values
//!   rendering as the empty string,
//! - a string starting with `=>` is a function call, e.g. `"=> date_ms(date_created)"`,
//! - every other value is copied through unchanged.
//!
//! Function arguments are either input paths or single-quoted literals. Supported functions:
//!
//! | Function | Result |
//! |---|---|
//! | `date_ms(x)` | `x` parsed as an RFC 3339 / ISO date, as epoch milliseconds |
//! | `iso_date(x)` | epoch milliseconds `x` as an RFC 3339 string |
//! | `either(a, b, ...)` | the first argument that is present and non-empty |
//! | `concat(a, b, ...)` | the textual concatenation of the present arguments |

use crate::{OpenEhrError, OpenEhrResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Render `template` against `input`.
///
/// # Errors
///
/// Returns [`OpenEhrError::Translation`] if the template calls an unknown function or a
/// function call is malformed.
pub fn transform(template: &Value, input: &Value) -> OpenEhrResult<Value> {
    Ok(render(template, input)?.unwrap_or(Value::Null))
}

fn render(node: &Value, input: &Value) -> OpenEhrResult<Option<Value>> {
    match node {
        Value::String(text) => render_string(text, input),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(rendered) = render(value, input)? {
                    out.insert(key.clone(), rendered);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(rendered) = render(item, input)? {
                    out.push(rendered);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        other => Ok(Some(other.clone())),
    }
}

fn render_string(text: &str, input: &Value) -> OpenEhrResult<Option<Value>> {
    if let Some(expr) = text.strip_prefix("=>") {
        return call_function(expr.trim(), input);
    }

    if let Some(path) = whole_placeholder(text) {
        return Ok(lookup(input, path).filter(|v| !v.is_null()).cloned());
    }

    if !text.contains("{{") {
        return Ok(Some(Value::String(text.to_owned())));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Some(value) = lookup(input, after[..end].trim()) {
                    out.push_str(&as_text(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    Ok(Some(Value::String(out)))
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Resolve a dotted path (`a.b.0.c`) within `input`.
pub fn lookup<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(input);
    }
    path.split('.').try_fold(input, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

enum Arg {
    Literal(String),
    Path(String),
}

fn call_function(expr: &str, input: &Value) -> OpenEhrResult<Option<Value>> {
    let (name, args) = parse_call(expr)?;
    let values: Vec<Option<Value>> = args
        .iter()
        .map(|arg| match arg {
            Arg::Literal(s) => Some(Value::String(s.clone())),
            Arg::Path(p) => lookup(input, p).filter(|v| !v.is_null()).cloned(),
        })
        .collect();

    match name {
        "date_ms" => {
            let [value] = single_arg(name, values)?;
            Ok(value.and_then(|v| match v {
                Value::Number(n) => Some(Value::Number(n)),
                Value::String(s) => parse_date_ms(&s).map(Value::from),
                _ => None,
            }))
        }
        "iso_date" => {
            let [value] = single_arg(name, values)?;
            Ok(value.and_then(|v| match v {
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .map(|dt| Value::String(dt.to_rfc3339())),
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            }))
        }
        "either" => Ok(values
            .into_iter()
            .flatten()
            .find(|v| !matches!(v, Value::String(s) if s.is_empty()))),
        "concat" => {
            let parts: Vec<String> = values.iter().flatten().map(as_text).collect();
            if parts.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::String(parts.concat())))
            }
        }
        other => Err(OpenEhrError::Translation(format!(
            "unknown template function: {other}"
        ))),
    }
}

fn single_arg(name: &str, values: Vec<Option<Value>>) -> OpenEhrResult<[Option<Value>; 1]> {
    <[Option<Value>; 1]>::try_from(values).map_err(|v| {
        OpenEhrError::Translation(format!(
            "{name} expects exactly one argument, got {}",
            v.len()
        ))
    })
}

fn parse_call(expr: &str) -> OpenEhrResult<(&str, Vec<Arg>)> {
    let malformed = || OpenEhrError::Translation(format!("malformed template function: {expr}"));

    let open = expr.find('(').ok_or_else(malformed)?;
    let inner = expr[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let name = expr[..open].trim();
    if name.is_empty() {
        return Err(malformed());
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    for ch in inner.chars() {
        match ch {
            '\'' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            ',' if !in_quotes => {
                args.push(finish_arg(&current, quoted));
                current.clear();
                quoted = false;
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err(malformed());
    }
    if !current.trim().is_empty() || quoted {
        args.push(finish_arg(&current, quoted));
    }

    Ok((name, args))
}

fn finish_arg(raw: &str, quoted: bool) -> Arg {
    if quoted {
        Arg::Literal(raw.trim().to_owned())
    } else {
        Arg::Path(raw.trim().to_owned())
    }
}

/// Parse an RFC 3339 timestamp, a naive ISO timestamp or a plain date into epoch millis.
pub fn parse_date_ms(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
