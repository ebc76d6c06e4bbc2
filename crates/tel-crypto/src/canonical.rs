//! Canonical record encoding.
//!
//! The byte stream fed to the digest is a compact JSON object whose top-level
//! fields always appear in the order `id`, `stream`, `timestamp`, `payload`,
//! `meta`. `meta` is left out entirely when absent. Inside `payload` and
//! `meta`, object keys are sorted by their UTF-8 bytes at every depth and
//! arrays keep their order.
//!
//! Changing any of these rules changes every hash ever produced.

use serde_json::{Map, Value};
use tel_types::Record;

/// Encode a record into its canonical byte form.
pub fn serialize_canonical(record: &Record) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(b"{\"id\":");
    write_str(&mut out, &record.id);
    out.extend_from_slice(b",\"stream\":");
    write_str(&mut out, &record.stream);
    out.extend_from_slice(b",\"timestamp\":");
    out.extend_from_slice(record.timestamp.to_string().as_bytes());
    out.extend_from_slice(b",\"payload\":");
    write_value(&mut out, &record.payload);
    if let Some(meta) = &record.meta {
        out.extend_from_slice(b",\"meta\":");
        write_value(&mut out, meta);
    }
    out.push(b'}');
    out
}

/// Encode an arbitrary value with recursively sorted object keys.
pub fn canonical_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_str(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut Vec<u8>, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    out.push(b'{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_str(out, key);
        out.push(b':');
        write_value(out, &map[key]);
    }
    out.push(b'}');
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}
