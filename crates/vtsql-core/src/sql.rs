//! SQL text helpers for MySQL-protocol servers
//!
//! Statements are sent over the text protocol with parameters rendered as
//! literals, so quoting lives in one place.

use crate::{Result, Value, VtError};

/// Escape a MySQL identifier (column name, etc.)
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Escape a table name which may be qualified (e.g., "database.table")
pub fn quote_table_name(table_name: &str) -> String {
    match table_name.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        None => quote_identifier(table_name),
    }
}

/// Escape a string as a single-quoted SQL literal
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Render a value as a SQL literal
pub fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::String(v) => quote_string(v),
        Value::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
            format!("X'{}'", hex)
        }
        Value::Json(v) => quote_string(&v.to_string()),
        Value::Date(v) => format!("'{}'", v),
        Value::Time(v) => format!("'{}'", v),
        Value::DateTime(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::DateTimeUtc(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.f")),
    }
}

/// Substitute `?` placeholders with literal parameter values
///
/// Placeholders inside quoted strings, quoted identifiers and comments are
/// left alone. The number of placeholders must match `params` exactly.
pub fn bind_params(sql: &str, params: &[Value]) -> Result<String> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut params_iter = params.iter();
    let mut used = 0usize;
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == '\\' && q != '`' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                out.push(ch);
            }
            '-' if chars.peek() == Some(&'-') => {
                // line comment, copy through to end of line
                out.push(ch);
                for c in chars.by_ref() {
                    out.push(c);
                    if c == '\n' {
                        break;
                    }
                }
            }
            '?' => {
                let value = params_iter.next().ok_or_else(|| {
                    VtError::InvalidInput(format!(
                        "statement has more placeholders than the {} parameters given",
                        params.len()
                    ))
                })?;
                used += 1;
                out.push_str(&quote_literal(value));
            }
            _ => out.push(ch),
        }
    }

    if used != params.len() {
        return Err(VtError::InvalidInput(format!(
            "statement has {} placeholders but {} parameters were given",
            used,
            params.len()
        )));
    }

    Ok(out)
}
