//! Textual rendering of values.
//!
//! The printer is total: every [`Value`] has a printed form. Output reads
//! back through the parser to an equal datum for everything except closures,
//! value bundles and the unspecified marker.

use crate::ast::{NumberType, Value};

/// Render a value as source-like text.
///
/// A top-level string prints verbatim (this is what `display` shows), while
/// strings nested inside lists are quoted so the list reads back as data.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_value(&mut out, other);
            out
        }
    }
}

fn format_number(n: NumberType) -> String {
    if n.is_nan() {
        "+nan.0".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "+inf.0" } else { "-inf.0" }.to_owned()
    } else if n == 0.0 {
        // Collapse negative zero
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::Bool(true) => out.push_str("#t"),
        Value::Bool(false) => out.push_str("#f"),
        Value::String(s) => {
            out.push('"');
            for ch in s.chars() {
                if ch == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(ch);
                }
            }
            out.push('"');
        }
        Value::Symbol(s) => out.push_str(s),
        Value::List(items) => match items.as_slice() {
            [Value::Symbol(head), datum] if head == "quote" => {
                out.push('\'');
                write_value(out, datum);
            }
            _ => write_sequence(out, None, items),
        },
        Value::Values(items) => write_sequence(out, Some("values"), items),
        Value::Closure(closure) => {
            out.push_str("(lambda ");
            write_value(out, &closure.params.to_value());
            for form in &closure.body {
                out.push(' ');
                write_value(out, form);
            }
            out.push(')');
        }
        Value::Unspecified => out.push_str("#<unspecified>"),
    }
}

fn write_sequence(out: &mut String, head: Option<&str>, items: &[Value]) {
    out.push('(');
    let mut first = true;
    if let Some(head) = head {
        out.push_str(head);
        first = false;
    }
    for item in items {
        if !first {
            out.push(' ');
        }
        first = false;
        write_value(out, item);
    }
    out.push(')');
}

/// `stringify` truncated to `max` characters, with `...` appended when cut.
pub(crate) fn stringify_truncated(value: &Value, max: usize) -> String {
    let text = stringify(value);
    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}
