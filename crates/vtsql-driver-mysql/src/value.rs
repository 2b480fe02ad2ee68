//! Conversion of `mysql_async` values into vtsql values

use chrono::{NaiveDate, NaiveTime};
use mysql_async::consts::ColumnType;
use vtsql_core::{Value, parse_datetime};

/// Convert mysql_async Value to our Value type, using column type metadata
/// to correctly interpret byte strings from the text protocol.
pub(crate) fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => text_to_value(s, col_type),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => {
            if u <= i64::MAX as u64 {
                Value::Int64(u as i64)
            } else {
                Value::Decimal(u.to_string())
            }
        }
        mysql_async::Value::Float(f) => Value::Float64(f64::from(f)),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            let is_date_column = col_type == ColumnType::MYSQL_TYPE_DATE;
            match date {
                Some(date) if is_date_column => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro)
                    .map(Value::DateTime)
                    .unwrap_or_else(|| Value::Date(date)),
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            if !negative && total_hours < 24 {
                if let Some(t) = NaiveTime::from_hms_micro_opt(
                    total_hours,
                    u32::from(mins),
                    u32::from(secs),
                    micros,
                ) {
                    return Value::Time(t);
                }
            }
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn text_to_value(s: String, col_type: ColumnType) -> Value {
    match col_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_YEAR => match s.parse::<i64>() {
            Ok(v) => Value::Int64(v),
            Err(_) => Value::Decimal(s),
        },
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => s
            .parse::<f64>()
            .map(Value::Float64)
            .unwrap_or(Value::String(s)),
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Value::Decimal(s),
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => Value::Date(d),
                Err(_) => Value::String(s),
            }
        }
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => match parse_datetime(&s) {
            Some(dt) => Value::DateTime(dt),
            None => Value::String(s),
        },
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_str(&s) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::String(s),
        },
        _ => Value::String(s),
    }
}
