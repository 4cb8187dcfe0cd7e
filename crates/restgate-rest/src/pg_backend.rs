//! PostgreSQL backend on a sqlx connection pool

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{
    PgArguments, PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef,
};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use restgate_common::config::DatabaseConfig;
use restgate_common::error::{Error, Result};
use restgate_common::types::{ColumnInfo, TableInfo};

use crate::backend::QueryBackend;
use crate::decode::{decode_stream, JsonRow, WireRow, WireValue};
use crate::schema::SchemaCache;
use crate::sql::{BindValue, BuiltQuery};

fn db_err(e: sqlx::Error) -> Error {
    Error::DatabaseError(e.to_string())
}

fn decode_err(e: impl std::fmt::Display) -> Error {
    Error::DecodeError(e.to_string())
}

/// Query backend over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Create the pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to connect to database: {e}")))?;

        info!("Successfully connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn catalog_loader(&self) -> PgCatalogLoader {
        PgCatalogLoader {
            pool: self.pool.clone(),
        }
    }
}

fn bind_query<'q>(sql: &'q str, params: &'q [BindValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Float(f) => query.bind(*f),
            BindValue::Text(s) => query.bind(s.as_str()),
            BindValue::Json(v) => query.bind(Json(v.clone())),
        };
    }
    query
}

#[async_trait]
impl QueryBackend for PgBackend {
    async fn fetch_all(&self, queries: &[BuiltQuery]) -> Result<Vec<Vec<JsonRow>>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            debug!(sql = %query.sql, params = query.params.len(), "Executing query");
            let rows = bind_query(&query.sql, &query.params)
                .fetch(&mut *conn)
                .map_err(db_err);
            results.push(decode_stream(rows).await?);
        }

        Ok(results)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ============================================================================
// Row decoding
// ============================================================================

impl WireRow for PgRow {
    fn wire_columns(&self) -> Result<Vec<(String, WireValue)>> {
        self.columns()
            .iter()
            .map(|col| {
                let decoder = column_decoder(col.type_info());
                let value = wire_value(self, col.ordinal(), decoder, col.type_info().name())?;
                Ok((col.name().to_string(), value))
            })
            .collect()
    }
}

/// How a column is read off the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    /// Text-like types whose value is UTF-8 in both wire formats
    Text,
    Uuid,
    Json,
    Jsonb,
    Bytea,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    BoolArray,
    Int2Array,
    Int4Array,
    Int8Array,
    Float4Array,
    Float8Array,
    TextArray,
    UuidArray,
    TimestampArray,
    TimestampTzArray,
    DateArray,
    TimeArray,
    Unsupported,
}

/// Enums and domains resolve before the name lookup
fn column_decoder(info: &PgTypeInfo) -> Decoder {
    match info.kind() {
        PgTypeKind::Enum(_) => Decoder::Text,
        PgTypeKind::Domain(base) => column_decoder(base),
        _ => decoder_for(info.name()),
    }
}

/// Decoder for a driver type name. Extension types report their lowercase name.
fn decoder_for(type_name: &str) -> Decoder {
    match type_name {
        "BOOL" => Decoder::Bool,
        "INT2" => Decoder::Int2,
        "INT4" => Decoder::Int4,
        "INT8" => Decoder::Int8,
        "FLOAT4" => Decoder::Float4,
        "FLOAT8" => Decoder::Float8,
        "NUMERIC" => Decoder::Numeric,
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "\"CHAR\"" | "NAME" | "XML" | "UNKNOWN"
        | "citext" => Decoder::Text,
        "UUID" => Decoder::Uuid,
        "JSON" => Decoder::Json,
        "JSONB" => Decoder::Jsonb,
        "BYTEA" => Decoder::Bytea,
        "TIMESTAMP" => Decoder::Timestamp,
        "TIMESTAMPTZ" => Decoder::TimestampTz,
        "DATE" => Decoder::Date,
        "TIME" => Decoder::Time,
        "BOOL[]" => Decoder::BoolArray,
        "INT2[]" => Decoder::Int2Array,
        "INT4[]" => Decoder::Int4Array,
        "INT8[]" => Decoder::Int8Array,
        "FLOAT4[]" => Decoder::Float4Array,
        "FLOAT8[]" => Decoder::Float8Array,
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "BPCHAR[]" | "NAME[]" => Decoder::TextArray,
        "UUID[]" => Decoder::UuidArray,
        "TIMESTAMP[]" => Decoder::TimestampArray,
        "TIMESTAMPTZ[]" => Decoder::TimestampTzArray,
        "DATE[]" => Decoder::DateArray,
        "TIME[]" => Decoder::TimeArray,
        _ => Decoder::Unsupported,
    }
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(idx).map_err(decode_err)
}

fn array<'r, T>(row: &'r PgRow, idx: usize, f: impl Fn(T) -> WireValue) -> Result<WireValue>
where
    Vec<Option<T>>: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    let items: Vec<Option<T>> = get(row, idx)?;
    Ok(WireValue::Array(
        items
            .into_iter()
            .map(|item| item.map_or(WireValue::Null, &f))
            .collect(),
    ))
}

fn wire_value(row: &PgRow, idx: usize, decoder: Decoder, type_name: &str) -> Result<WireValue> {
    let raw = row.try_get_raw(idx).map_err(decode_err)?;
    if raw.is_null() {
        return Ok(WireValue::Null);
    }

    let value = match decoder {
        Decoder::Bool => WireValue::Bool(get(row, idx)?),
        Decoder::Int2 => WireValue::Int(i64::from(get::<i16>(row, idx)?)),
        Decoder::Int4 => WireValue::Int(i64::from(get::<i32>(row, idx)?)),
        Decoder::Int8 => WireValue::Int(get(row, idx)?),
        Decoder::Float4 => WireValue::Float(f64::from(get::<f32>(row, idx)?)),
        Decoder::Float8 => WireValue::Float(get(row, idx)?),
        Decoder::Numeric => WireValue::Numeric(match raw.format() {
            PgValueFormat::Binary => numeric_to_string(raw.as_bytes().map_err(decode_err)?)?,
            PgValueFormat::Text => raw.as_str().map_err(decode_err)?.to_string(),
        }),
        Decoder::Text => WireValue::Text(raw_text(&raw)?),
        Decoder::Uuid => WireValue::Uuid(*get::<sqlx::types::Uuid>(row, idx)?.as_bytes()),
        Decoder::Json => WireValue::Bytes(json_bytes(&raw, false)?),
        Decoder::Jsonb => WireValue::Bytes(json_bytes(&raw, true)?),
        Decoder::Bytea => WireValue::Bytes(get(row, idx)?),
        Decoder::Timestamp => WireValue::Timestamp(get(row, idx)?),
        Decoder::TimestampTz => WireValue::TimestampTz(get(row, idx)?),
        Decoder::Date => WireValue::Date(get(row, idx)?),
        Decoder::Time => WireValue::Time(get(row, idx)?),
        Decoder::BoolArray => array::<bool>(row, idx, WireValue::Bool)?,
        Decoder::Int2Array => array::<i16>(row, idx, |v| WireValue::Int(i64::from(v)))?,
        Decoder::Int4Array => array::<i32>(row, idx, |v| WireValue::Int(i64::from(v)))?,
        Decoder::Int8Array => array::<i64>(row, idx, WireValue::Int)?,
        Decoder::Float4Array => array::<f32>(row, idx, |v| WireValue::Float(f64::from(v)))?,
        Decoder::Float8Array => array::<f64>(row, idx, WireValue::Float)?,
        Decoder::TextArray => array::<String>(row, idx, WireValue::Text)?,
        Decoder::UuidArray => {
            array::<sqlx::types::Uuid>(row, idx, |v| WireValue::Uuid(*v.as_bytes()))?
        }
        Decoder::TimestampArray => array::<NaiveDateTime>(row, idx, WireValue::Timestamp)?,
        Decoder::TimestampTzArray => array::<DateTime<Utc>>(row, idx, WireValue::TimestampTz)?,
        Decoder::DateArray => array::<NaiveDate>(row, idx, WireValue::Date)?,
        Decoder::TimeArray => array::<NaiveTime>(row, idx, WireValue::Time)?,
        Decoder::Unsupported => match raw.format() {
            PgValueFormat::Text => WireValue::Text(raw_text(&raw)?),
            PgValueFormat::Binary => {
                return Err(Error::DecodeError(format!(
                    "unsupported column type {type_name}; select it as text"
                )));
            }
        },
    };

    Ok(value)
}

/// Text-like values are UTF-8 in both the text and binary formats
fn raw_text(raw: &PgValueRef<'_>) -> Result<String> {
    text_from_bytes(raw.as_bytes().map_err(decode_err)?)
}

fn text_from_bytes(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(ToString::to_string)
        .map_err(decode_err)
}

/// Raw JSON text; binary JSONB carries a leading version byte
fn json_bytes(raw: &PgValueRef<'_>, jsonb: bool) -> Result<Vec<u8>> {
    let bytes = raw.as_bytes().map_err(decode_err)?;
    let bytes = match (jsonb, raw.format()) {
        (true, PgValueFormat::Binary) => bytes
            .split_first()
            .map(|(_version, rest)| rest)
            .unwrap_or_default(),
        _ => bytes,
    };
    Ok(bytes.to_vec())
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary-format NUMERIC (base-10000 digit groups) as decimal text
fn numeric_to_string(bytes: &[u8]) -> Result<String> {
    let word = |i: usize| -> Result<u16> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| Error::DecodeError("truncated numeric value".to_string()))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<u16>>>()?;
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                out.push_str(&digit(i).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(i)));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::new();
        let mut i = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// ============================================================================
// Catalog loading
// ============================================================================

const COLUMNS_SQL: &str = "SELECT c.table_name::text, c.column_name::text, c.data_type::text, \
     c.udt_name::text, (c.is_nullable = 'YES') AS is_nullable, \
     (c.column_default IS NOT NULL) AS has_default \
     FROM information_schema.columns c \
     WHERE c.table_schema = $1 \
     ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT kcu.table_name::text, kcu.column_name::text \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name \
      AND tc.table_schema = kcu.table_schema \
      AND tc.table_name = kcu.table_name \
     WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 \
     ORDER BY kcu.table_name, kcu.ordinal_position";

/// Loads the schema catalog from `information_schema` once at startup
#[derive(Debug, Clone)]
pub struct PgCatalogLoader {
    pool: PgPool,
}

impl PgCatalogLoader {
    pub async fn load(&self, schema: &str) -> Result<SchemaCache> {
        let columns: Vec<(String, String, String, String, bool, bool)> =
            sqlx::query_as(COLUMNS_SQL)
                .bind(schema)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let primary_keys: Vec<(String, String)> = sqlx::query_as(PRIMARY_KEYS_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut tables: Vec<TableInfo> = Vec::new();
        for (table, name, data_type, udt_name, is_nullable, has_default) in columns {
            if tables.last().map_or(true, |t| t.name != table) {
                tables.push(TableInfo::new(schema, table.as_str()));
            }
            if let Some(current) = tables.last_mut() {
                current.columns.push(ColumnInfo {
                    name,
                    data_type: column_type(&data_type, &udt_name),
                    is_nullable,
                    has_default,
                });
            }
        }

        for table in &mut tables {
            table.primary_key = primary_keys
                .iter()
                .filter(|(t, _)| *t == table.name)
                .map(|(_, c)| c.clone())
                .collect();
        }

        info!(schema, tables = tables.len(), "Loaded schema catalog");
        Ok(SchemaCache::from_tables(tables))
    }
}

/// Usable type name for casts: arrays as `elem[]`, user-defined types by their udt name
fn column_type(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "ARRAY" => format!("{}[]", udt_name.trim_start_matches('_')),
        "USER-DEFINED" => udt_name.to_string(),
        other => other.to_string(),
    }
}
