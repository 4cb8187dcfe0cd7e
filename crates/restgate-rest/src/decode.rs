//! Wire-level row decoding into JSON objects

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::{Stream, StreamExt};
use serde_json::{Map, Number, Value as JsonValue};

use restgate_common::error::Result;

/// Decoded row, keyed by column name in result-set order
pub type JsonRow = Map<String, JsonValue>;

/// Driver-level column value
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision numeric in its text form
    Numeric(String),
    Text(String),
    /// Raw bytes; may hold JSON
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Array(Vec<WireValue>),
}

/// A result row that can expose its columns as wire values
pub trait WireRow {
    fn wire_columns(&self) -> Result<Vec<(String, WireValue)>>;
}

impl WireRow for Vec<(String, WireValue)> {
    fn wire_columns(&self) -> Result<Vec<(String, WireValue)>> {
        Ok(self.clone())
    }
}

/// Convert one wire value to JSON
pub fn decode_value(value: WireValue) -> JsonValue {
    match value {
        WireValue::Null => JsonValue::Null,
        WireValue::Bool(b) => JsonValue::Bool(b),
        WireValue::Int(i) => JsonValue::Number(i.into()),
        WireValue::Float(f) => match Number::from_f64(f) {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::String(non_finite(f).to_string()),
        },
        WireValue::Numeric(s) => decode_numeric(s),
        WireValue::Text(s) => JsonValue::String(s),
        WireValue::Bytes(bytes) => decode_bytes(&bytes),
        WireValue::Uuid(bytes) => JsonValue::String(uuid::Uuid::from_bytes(bytes).to_string()),
        WireValue::Timestamp(ts) => {
            JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        WireValue::TimestampTz(ts) => JsonValue::String(ts.to_rfc3339()),
        WireValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        WireValue::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
        WireValue::Array(items) => JsonValue::Array(items.into_iter().map(decode_value).collect()),
    }
}

/// Bytes that parse as JSON become that JSON, anything else a lossy string
fn decode_bytes(bytes: &[u8]) -> JsonValue {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Numerics stay numbers only when no precision or formatting is lost
fn decode_numeric(s: String) -> JsonValue {
    if let Ok(i) = s.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    match s.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) if n.to_string() == s => JsonValue::Number(n),
        _ => JsonValue::String(s),
    }
}

fn non_finite(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Decode one row into a JSON object
pub fn decode_row<R: WireRow>(row: &R) -> Result<JsonRow> {
    let mut object = Map::new();
    for (name, value) in row.wire_columns()? {
        object.insert(name, decode_value(value));
    }
    Ok(object)
}

/// Decode a row stream; the first stream or decode error aborts
pub async fn decode_stream<R, S>(mut rows: S) -> Result<Vec<JsonRow>>
where
    R: WireRow,
    S: Stream<Item = Result<R>> + Unpin,
{
    let mut out = Vec::new();
    while let Some(row) = rows.next().await {
        out.push(decode_row(&row?)?);
    }
    Ok(out)
}
