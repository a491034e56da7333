use serde_json::{Map, Value};

/// Reserved slot name holding an element's attributes.
pub const ATTRIBUTES_KEY: &str = "@attributes";

/// Serializes a bound layout with no tag prefix and the default attribute key.
pub fn serialize(node: &Value) -> String {
    serialize_with(node, "", ATTRIBUTES_KEY)
}

/// Serializes a nested structure to markup.
///
/// Scalars are written as-is, without escaping. Index entries (array items,
/// digit-only keys) open no tag of their own. Empty and `null` values render
/// as an explicit start/end pair.
pub fn serialize_with(node: &Value, tag_prefix: &str, attributes_key: &str) -> String {
    let mut out = String::new();
    write_content(&mut out, node, tag_prefix, attributes_key);
    out
}

fn write_content(out: &mut String, node: &Value, prefix: &str, attributes_key: &str) {
    match node {
        Value::Object(entries) => {
            for (key, value) in entries {
                if key == attributes_key {
                    continue;
                }
                let tag = (!is_index(key)).then_some(key.as_str());
                write_entry(out, tag, value, prefix, attributes_key);
            }
        }
        Value::Array(items) => {
            for item in items {
                write_entry(out, None, item, prefix, attributes_key);
            }
        }
        scalar => out.push_str(&scalar_text(scalar)),
    }
}

fn write_entry(out: &mut String, tag: Option<&str>, value: &Value, prefix: &str, attributes_key: &str) {
    if let Some(tag) = tag {
        out.push('<');
        out.push_str(prefix);
        out.push_str(tag);
        if let Some(Value::Object(attributes)) = value.get(attributes_key) {
            write_attributes(out, attributes);
        }
        out.push('>');
    }

    write_content(out, value, prefix, attributes_key);

    if let Some(tag) = tag {
        out.push_str("</");
        out.push_str(prefix);
        out.push_str(tag);
        out.push('>');
    }
}

fn write_attributes(out: &mut String, attributes: &Map<String, Value>) {
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&scalar_text(value));
        out.push('"');
    }
}

// non-negative integers without leading zeros, the keys a list would carry
fn is_index(key: &str) -> bool {
    match key.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        bytes => bytes.iter().all(u8::is_ascii_digit),
    }
}

/// Text form of a scalar: `null` and `false` are empty, `true` is `1`, and
/// integral numbers drop their fractional part (`0.00` is written `0`).
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        },
        Value::String(text) => text.clone(),
        // nested values never reach here from write_content; attributes may hold them
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Replaces the masculine ordinal indicator (`º`) with a space and trims.
///
/// The target service rejects the character; the replacement is idempotent.
pub fn clean_markup(markup: &str) -> String {
    markup.replace('\u{ba}', " ").trim().to_string()
}

/// [`clean_markup`] for raw bytes; invalid UTF-8 sequences are replaced.
pub fn clean_markup_bytes(markup: &[u8]) -> String {
    clean_markup(&String::from_utf8_lossy(markup))
}
