//! SQL text helpers: identifier quoting and client-side `?` binding

use serde_json::Value;

use crate::dispatch::{BridgeError, BridgeResult};

/// Backtick-quote an identifier
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('`');
    out
}

/// Render a JSON value as a SQL literal
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(_) => quote_string(&value.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Replace each `?` outside quotes with the next argument as a literal.
///
/// The number of placeholders must equal the number of arguments.
pub fn bind_positional(sql: &str, args: &[Value]) -> BridgeResult<String> {
    if args.is_empty() && !sql.contains('?') {
        return Ok(sql.to_string());
    }

    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let mut args_iter = args.iter();
    let mut placeholders = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in sql.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '?' => {
                placeholders += 1;
                match args_iter.next() {
                    Some(arg) => out.push_str(&literal(arg)),
                    None => out.push('?'),
                }
            }
            _ => out.push(c),
        }
    }

    if placeholders != args.len() {
        return Err(BridgeError::invalid_request(format!(
            "statement has {} placeholders but {} arguments were given",
            placeholders,
            args.len()
        )));
    }
    Ok(out)
}
