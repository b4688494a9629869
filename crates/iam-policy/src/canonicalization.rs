//! Canonical JSON rendering for request fingerprints.
//!
//! Two requests carrying the same data must produce the same bytes:
//! - object keys sorted lexicographically
//! - no insignificant whitespace
//! - numbers rendered by `serde_json`
//! - strings escaped the same way every time

use crate::error::Result;
use serde_json::Value;
use std::fmt::Write;

/// Canonicalizes a JSON value to a deterministic string representation.
pub fn canonicalize(value: &Value) -> Result<String> {
    let mut output = String::new();
    write_canonical(&mut output, value)?;
    Ok(output)
}

/// Computes the SHA-256 hex digest of the canonical form of a value.
pub fn canonical_hash(value: &Value) -> Result<String> {
    let canonical = canonicalize(value)?;
    Ok(crate::hash::sha256_str(&canonical))
}

fn write_canonical(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write!(out, "{}", n)?,
        Value::String(s) => write_escaped(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, key)?;
                out.push(':');
                write_canonical(out, item)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_escaped(out: &mut String, s: &str) -> Result<()> {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => write!(out, "\\u{:04x}", c as u32)?,
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(())
}
