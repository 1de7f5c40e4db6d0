//! Rendering of a resolved, joined configuration map to stdout text.

use cogs_schema::tree::simple_to_string;
use cogs_schema::{FlatMap, Value};

pub fn json(map: &FlatMap) -> Result<String, String> {
    serde_json::to_string_pretty(map)
        .map(|s| s + "\n")
        .map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn yaml(map: &FlatMap) -> Result<String, String> {
    serde_yaml::to_string(map).map_err(|e| format!("YAML serialization failed: {e}"))
}

pub fn toml(map: &FlatMap) -> Result<String, String> {
    toml::to_string(map).map_err(|e| format!("TOML serialization failed: {e}"))
}

/// `KEY="value"` lines sorted by key. Integers stay unquoted; everything
/// else is double quoted and escaped.
pub fn dotenv(map: &FlatMap) -> Result<String, String> {
    let mut lines = Vec::with_capacity(map.len());
    for (key, value) in map {
        let text = text(key, value)?;
        if text.parse::<i64>().is_ok() {
            lines.push(format!("{key}={text}"));
        } else {
            lines.push(format!("{key}=\"{}\"", escape_double_quoted(&text)));
        }
    }
    lines.sort();
    Ok(lines.join("\n") + "\n")
}

/// Values joined by `sep`, in `keys` order when given, key order otherwise.
pub fn raw(map: &FlatMap, keys: &[String], sep: &str) -> Result<String, String> {
    let sep = match sep {
        "\\n" => "\n",
        "\\t" => "\t",
        other => other,
    };
    let values = if keys.is_empty() {
        map.iter()
            .map(|(key, value)| text(key, value))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        keys.iter()
            .map(|key| {
                let value = map
                    .get(key)
                    .ok_or_else(|| format!("key {key} is missing from generated config"))?;
                text(key, value)
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(values.join(sep))
}

/// Environment variable style key: `keyValue` and `key-value` both become
/// `KEY_VALUE`, acronyms stay together (`HTTPServer` is `HTTP_SERVER`).
pub fn upper_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_uppercase());
    }
    out.trim_end_matches('_').to_owned()
}

fn text(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => simple_to_string(other)
            .ok_or_else(|| format!("{key}: value cannot be rendered as a single line")),
    }
}

fn escape_double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '!' => out.push_str("\\!"),
            '$' => out.push_str("\\$"),
            '`' => out.push_str("\\`"),
            other => out.push(other),
        }
    }
    out
}
