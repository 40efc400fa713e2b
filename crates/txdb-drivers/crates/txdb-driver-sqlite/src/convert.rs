//! Conversions between txdb values and rusqlite values

use rusqlite::Statement;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use txdb_core::{Params, Result, TxdbError, Value};

/// Convert our Value type to the rusqlite owned value
pub(crate) fn value_to_rusqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(if *b { 1 } else { 0 }),
        Value::Int32(i) => SqliteValue::Integer(*i as i64),
        Value::Int64(i) => SqliteValue::Integer(*i),
        Value::Float64(f) => SqliteValue::Real(*f),
        Value::Decimal(d) => SqliteValue::Text(d.clone()),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Uuid(u) => SqliteValue::Text(u.to_string()),
        Value::Date(d) => SqliteValue::Text(d.to_string()),
        Value::Time(t) => SqliteValue::Text(t.to_string()),
        Value::DateTime(dt) => SqliteValue::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => SqliteValue::Text(dt.to_rfc3339()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
    }
}

/// Copy a column of the current row out of the statement.
///
/// SQLite storage classes map one to one; text stays text and blobs stay
/// bytes. TEXT holding invalid UTF-8 comes back as bytes, unaltered.
pub(crate) fn rusqlite_to_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value> {
    let value_ref = row.get_ref(idx).map_err(query_error)?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => match std::str::from_utf8(s) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::Bytes(s.to_vec()),
        },
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}

/// Bind positional or named parameters to a prepared statement.
///
/// Every parameter of the statement must be bound, so values bound by an
/// earlier use of a cached statement never leak into this one.
pub(crate) fn bind_params(stmt: &mut Statement<'_>, params: Params<'_>) -> Result<()> {
    let expected = stmt.parameter_count();
    if params.len() != expected {
        return Err(TxdbError::Query(format!(
            "statement expects {} parameters, got {}",
            expected,
            params.len()
        )));
    }

    match params {
        Params::Positional(values) => {
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, value_to_rusqlite(value))
                    .map_err(query_error)?;
            }
        }
        Params::Named(values) => {
            for (name, value) in values {
                let name = normalize_param_name(name);
                let idx = stmt
                    .parameter_index(&name)
                    .map_err(query_error)?
                    .ok_or_else(|| {
                        TxdbError::Query(format!("statement has no parameter named {}", name))
                    })?;
                stmt.raw_bind_parameter(idx, value_to_rusqlite(value))
                    .map_err(query_error)?;
            }
        }
    }

    Ok(())
}

/// Named parameters without a sigil are looked up as `:name`
fn normalize_param_name(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{}", name)
    }
}

/// Map a rusqlite error raised while running a statement
pub(crate) fn query_error(err: rusqlite::Error) -> TxdbError {
    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
        return TxdbError::Cancelled;
    }
    TxdbError::Query(err.to_string())
}
