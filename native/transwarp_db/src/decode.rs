/// Decoding and type conversion utilities
///
/// This module converts between the crate's [`Value`] and the LibSQL driver's
/// value type, and parses connection mode names.
use crate::config::Mode;
use crate::models::Value;

/// Decode a mode name to a Mode enum
///
/// Accepts `local`, `remote` and `remote_replica`, case-insensitively.
pub fn decode_mode(name: &str) -> Option<Mode> {
    match name.trim().to_ascii_lowercase().as_str() {
        "remote_replica" => Some(Mode::RemoteReplica),
        "remote" => Some(Mode::Remote),
        "local" => Some(Mode::Local),
        _ => None,
    }
}

/// Convert a bound parameter to the driver's value type
pub fn to_driver_value(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Integer(v) => libsql::Value::Integer(*v),
        Value::Real(v) => libsql::Value::Real(*v),
        Value::Text(v) => libsql::Value::Text(v.clone()),
        Value::Blob(v) => libsql::Value::Blob(v.clone()),
    }
}

/// Convert a driver column value to the crate's value type
pub fn from_driver_value(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(v) => Value::Integer(v),
        libsql::Value::Real(v) => Value::Real(v),
        libsql::Value::Text(v) => Value::Text(v),
        libsql::Value::Blob(v) => Value::Blob(v),
    }
}
