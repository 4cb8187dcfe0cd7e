//! Parameterized SQL generation against a validated table
//!
//! Every identifier goes through [`quote_ident`] and every value becomes a
//! numbered bind parameter; nothing from the request is spliced into the SQL
//! text. All validation runs before any SQL is rendered.

use serde_json::{Map, Value as JsonValue};

use restgate_common::error::{Error, Result};
use restgate_common::types::{ColumnInfo, TableInfo};

use crate::filter::{Filter, FilterOperator, FilterValue};
use crate::query::{NullsOrder, QueryParams};

/// Postgres identifier length limit
const MAX_IDENT_LEN: usize = 63;

/// Value bound to a `$n` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

/// SQL text plus its bind parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// Conflict handling for INSERT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Explicit conflict target; falls back to the primary key
    pub on_conflict: Option<Vec<String>>,
    /// `ON CONFLICT DO NOTHING`
    pub ignore_duplicates: bool,
    /// Null out every non-target column the record does not mention
    pub default_to_null: bool,
}

/// Quote an identifier, rejecting anything outside `[A-Za-z_][A-Za-z0-9_$]*`
pub fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !valid_start || !valid_rest || name.len() > MAX_IDENT_LEN {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }

    Ok(format!("\"{name}\""))
}

/// Exact, case-sensitive membership in a resolved conflict target
pub fn is_in_conflict_target(column: &str, target: &[String]) -> bool {
    target.iter().any(|c| c == column)
}

/// Parse an `on_conflict` parameter: comma-separated, whitespace trimmed
pub fn parse_on_conflict(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Accumulates bind parameters and hands out placeholders
#[derive(Debug, Default)]
struct Params {
    values: Vec<BindValue>,
}

impl Params {
    fn push(&mut self, value: BindValue, cast: Option<&str>) -> String {
        self.values.push(value);
        match cast {
            Some(ty) => format!("${}::{}", self.values.len(), ty),
            None => format!("${}", self.values.len()),
        }
    }
}

/// SQL builder for one catalog table
pub struct SqlBuilder<'a> {
    table: &'a TableInfo,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(table: &'a TableInfo) -> Self {
        Self { table }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn column(&self, name: &str) -> Result<&'a ColumnInfo> {
        self.table
            .get_column(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    fn validate_columns<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Result<()> {
        for name in names {
            self.column(name)?;
        }
        Ok(())
    }

    /// Check every column a query references against the catalog
    pub fn validate_params(&self, params: &QueryParams) -> Result<()> {
        self.validate_columns(
            params
                .select
                .iter()
                .map(String::as_str)
                .filter(|c| *c != "*"),
        )?;
        self.validate_columns(params.filters.iter().map(|f| f.column.as_str()))?;
        self.validate_columns(params.order.iter().map(|o| o.column.as_str()))?;
        self.validate_columns(params.group_by.iter().map(String::as_str))?;

        if !params.group_by.is_empty() {
            if let Some(column) = params
                .select
                .iter()
                .find(|c| *c != "*" && !params.group_by.contains(c))
            {
                return Err(Error::InvalidQueryParam(format!(
                    "column '{column}' must appear in group_by"
                )));
            }
        }
        Ok(())
    }

    fn table_ref(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            quote_ident(&self.table.schema)?,
            quote_ident(&self.table.name)?
        ))
    }

    /// The single primary-key column used by by-id operations
    fn single_primary_key(&self) -> Result<&'a ColumnInfo> {
        match self.table.primary_key.as_slice() {
            [pk] => self.column(pk),
            [] => Err(Error::ValidationError(format!(
                "Table {} has no primary key",
                self.table.name
            ))),
            _ => Err(Error::ValidationError(format!(
                "Table {} has a composite primary key; use filters instead",
                self.table.name
            ))),
        }
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    /// `SELECT ... WHERE ... GROUP BY ... ORDER BY ... LIMIT ... OFFSET ...`
    pub fn build_select(&self, params: &QueryParams) -> Result<BuiltQuery> {
        self.validate_params(params)?;

        let mut binds = Params::default();
        let mut sql = self.select_core(params, &mut binds)?;

        if !params.order.is_empty() {
            let clauses = params
                .order
                .iter()
                .map(|o| {
                    let nulls = match o.nulls {
                        NullsOrder::First => " NULLS FIRST",
                        NullsOrder::Last => " NULLS LAST",
                        NullsOrder::Default => "",
                    };
                    let dir = if o.desc { "DESC" } else { "ASC" };
                    Ok(format!("{} {}{}", quote_ident(&o.column)?, dir, nulls))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = params.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = params.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    /// Total row count for the filtered (and grouped) set, ignoring pagination
    pub fn build_count(&self, params: &QueryParams) -> Result<BuiltQuery> {
        self.validate_params(params)?;

        let mut binds = Params::default();
        let sql = format!(
            "SELECT COUNT(*) AS \"count\" FROM ({}) AS \"_count\"",
            self.select_core(params, &mut binds)?
        );

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    /// Planner estimate for the filtered set
    pub fn build_explain(&self, params: &QueryParams) -> Result<BuiltQuery> {
        self.validate_params(params)?;

        let mut binds = Params::default();
        let sql = format!(
            "EXPLAIN (FORMAT JSON) {}",
            self.select_core(params, &mut binds)?
        );

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    fn select_core(&self, params: &QueryParams, binds: &mut Params) -> Result<String> {
        // A grouped read without an explicit column list returns the groups
        let select = if !params.group_by.is_empty() && selects_all(&params.select) {
            &params.group_by
        } else {
            &params.select
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            self.projection(select)?,
            self.table_ref()?
        );

        if let Some(clause) = self.where_clause(&params.filters, binds)? {
            sql.push_str(&format!(" WHERE {clause}"));
        }

        if !params.group_by.is_empty() {
            let columns = params
                .group_by
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }

        Ok(sql)
    }

    /// Column list for SELECT and RETURNING.
    ///
    /// Columns the row decoder cannot read natively are rendered as text;
    /// `*` is kept when no column needs that.
    fn projection(&self, select: &[String]) -> Result<String> {
        let columns = if selects_all(select) {
            if self.table.columns.iter().all(decodes_natively) {
                return Ok("*".to_string());
            }
            self.table.columns.iter().collect::<Vec<_>>()
        } else {
            select
                .iter()
                .map(|c| self.column(c))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(columns
            .into_iter()
            .map(|col| {
                let ident = quote_ident(&col.name)?;
                if decodes_natively(col) {
                    Ok(ident)
                } else {
                    Ok(format!("{ident}::text AS {ident}"))
                }
            })
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn returning(&self) -> Result<String> {
        Ok(format!(" RETURNING {}", self.projection(&[])?))
    }

    /// Single row by primary key
    pub fn build_select_by_pk(&self, id: &str, select: &[String]) -> Result<BuiltQuery> {
        let pk = self.single_primary_key()?;
        let params = QueryParams {
            select: select.to_vec(),
            filters: vec![Filter::and(
                pk.name.clone(),
                FilterOperator::Eq,
                FilterValue::Text(id.to_string()),
            )],
            ..Default::default()
        };
        self.build_select(&params)
    }

    // ------------------------------------------------------------------
    // WHERE
    // ------------------------------------------------------------------

    /// AND-joined conditions; each OR group is parenthesized where its first member appears
    fn where_clause(&self, filters: &[Filter], binds: &mut Params) -> Result<Option<String>> {
        let mut clauses = Vec::new();
        let mut emitted_groups = Vec::new();

        for filter in filters {
            if !filter.in_or_group() {
                clauses.push(self.condition(filter, binds)?);
                continue;
            }

            let group = filter.or_group_id;
            if emitted_groups.contains(&group) {
                continue;
            }
            emitted_groups.push(group);

            let members = filters
                .iter()
                .filter(|f| f.in_or_group() && f.or_group_id == group)
                .map(|f| self.condition(f, binds))
                .collect::<Result<Vec<_>>>()?;
            clauses.push(format!("({})", members.join(" OR ")));
        }

        if clauses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(clauses.join(" AND ")))
        }
    }

    fn condition(&self, filter: &Filter, binds: &mut Params) -> Result<String> {
        let column = self.column(&filter.column)?;
        let ident = quote_ident(&column.name)?;
        let cast = cast_type(column);

        match (filter.operator, &filter.value) {
            (FilterOperator::Is, value) => Ok(format!("{ident} IS {}", is_keyword(value)?)),
            (FilterOperator::In, FilterValue::List(items)) => {
                if items.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let placeholders = items
                    .iter()
                    .map(|item| Ok(binds.push(scalar_bind(item)?, cast)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{ident} IN ({})", placeholders.join(", ")))
            }
            (FilterOperator::In, item) => {
                Ok(format!("{ident} IN ({})", binds.push(scalar_bind(item)?, cast)))
            }
            (FilterOperator::Eq, FilterValue::Null) => Ok(format!("{ident} IS NULL")),
            (FilterOperator::Neq, FilterValue::Null) => Ok(format!("{ident} IS NOT NULL")),
            (op @ (FilterOperator::Like | FilterOperator::Ilike), FilterValue::Text(pattern)) => {
                let placeholder = binds.push(BindValue::Text(pattern.replace('*', "%")), None);
                let target = if is_text_column(column) {
                    ident
                } else {
                    format!("{ident}::text")
                };
                Ok(format!("{target} {} {placeholder}", op.sql()))
            }
            (op, FilterValue::List(_)) => Err(Error::InvalidFilter(format!(
                "operator '{op}' on column '{}' does not accept a list",
                filter.column
            ))),
            (op, FilterValue::Null) => Err(Error::InvalidFilter(format!(
                "operator '{op}' on column '{}' does not accept null; use is.null",
                filter.column
            ))),
            (op, value) => {
                let placeholder = binds.push(scalar_bind(value)?, cast);
                Ok(format!("{ident} {} {placeholder}", op.sql()))
            }
        }
    }

    // ------------------------------------------------------------------
    // INSERT / UPSERT
    // ------------------------------------------------------------------

    /// Resolve the conflict target: explicit list, else primary key
    pub fn resolve_conflict_target(&self, on_conflict: Option<&[String]>) -> Result<Vec<String>> {
        match on_conflict {
            Some(columns) if !columns.is_empty() => {
                for c in columns {
                    if !self.table.has_column(c) {
                        return Err(Error::UnknownConflictColumn(c.clone()));
                    }
                }
                Ok(columns.to_vec())
            }
            _ if !self.table.primary_key.is_empty() => Ok(self.table.primary_key.clone()),
            _ => Err(Error::MissingConflictTarget(self.table.name.clone())),
        }
    }

    /// Multi-row INSERT, optionally with `ON CONFLICT`.
    ///
    /// Column order is taken from the first record; keys first seen in later
    /// records are appended. Records missing a column bind NULL for it.
    pub fn build_insert(
        &self,
        records: &[JsonValue],
        upsert: Option<&UpsertOptions>,
    ) -> Result<BuiltQuery> {
        if records.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let objects = records
            .iter()
            .map(|r| {
                r.as_object().ok_or_else(|| {
                    Error::InvalidBody("each record must be a JSON object".to_string())
                })
            })
            .collect::<Result<Vec<&Map<String, JsonValue>>>>()?;

        let mut columns: Vec<String> = objects[0].keys().cloned().collect();
        for object in &objects[1..] {
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let column_info = columns
            .iter()
            .map(|c| self.column(c))
            .collect::<Result<Vec<_>>>()?;

        let conflict = upsert
            .map(|opts| {
                self.resolve_conflict_target(opts.on_conflict.as_deref())
                    .map(|target| (opts, target))
            })
            .transpose()?;

        let table_ref = self.table_ref()?;
        let mut binds = Params::default();

        let mut sql = if columns.is_empty() {
            if objects.len() > 1 {
                return Err(Error::ValidationError(
                    "No columns in insert data".to_string(),
                ));
            }
            format!("INSERT INTO {table_ref} DEFAULT VALUES")
        } else {
            let col_list = column_info
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Result<Vec<_>>>()?
                .join(", ");

            let mut rows = Vec::with_capacity(objects.len());
            for object in &objects {
                let values = column_info
                    .iter()
                    .map(|col| {
                        let value = object.get(&col.name).unwrap_or(&JsonValue::Null);
                        binds.push(column_bind(value, col), cast_type(col))
                    })
                    .collect::<Vec<_>>();
                rows.push(format!("({})", values.join(", ")));
            }

            format!(
                "INSERT INTO {table_ref} ({col_list}) VALUES {}",
                rows.join(", ")
            )
        };

        if let Some((opts, target)) = conflict {
            sql.push_str(&self.conflict_clause(opts, &target, &columns)?);
        }

        sql.push_str(&self.returning()?);

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    fn conflict_clause(
        &self,
        opts: &UpsertOptions,
        target: &[String],
        insert_columns: &[String],
    ) -> Result<String> {
        let target_sql = target
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        if opts.ignore_duplicates {
            return Ok(format!(" ON CONFLICT ({target_sql}) DO NOTHING"));
        }

        let assignments = if opts.default_to_null {
            self.table
                .columns
                .iter()
                .filter(|c| !is_in_conflict_target(&c.name, target))
                .map(|c| {
                    let ident = quote_ident(&c.name)?;
                    if insert_columns.contains(&c.name) {
                        Ok(format!("{ident} = EXCLUDED.{ident}"))
                    } else {
                        Ok(format!("{ident} = NULL"))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            insert_columns
                .iter()
                .filter(|c| !is_in_conflict_target(c, target))
                .map(|c| {
                    let ident = quote_ident(c)?;
                    Ok(format!("{ident} = EXCLUDED.{ident}"))
                })
                .collect::<Result<Vec<_>>>()?
        };

        if assignments.is_empty() {
            Ok(format!(" ON CONFLICT ({target_sql}) DO NOTHING"))
        } else {
            Ok(format!(
                " ON CONFLICT ({target_sql}) DO UPDATE SET {}",
                assignments.join(", ")
            ))
        }
    }

    // ------------------------------------------------------------------
    // UPDATE
    // ------------------------------------------------------------------

    /// Batch UPDATE over a filtered collection
    pub fn build_update(&self, patch: &JsonValue, filters: &[Filter]) -> Result<BuiltQuery> {
        let patch = patch
            .as_object()
            .ok_or_else(|| Error::InvalidBody("update body must be a JSON object".to_string()))?;
        if filters.is_empty() {
            return Err(Error::MissingFilter("Batch update"));
        }
        self.update_statement(patch, filters)
    }

    /// UPDATE of one row by primary key
    pub fn build_update_by_pk(&self, id: &str, patch: &JsonValue) -> Result<BuiltQuery> {
        let patch = patch
            .as_object()
            .ok_or_else(|| Error::InvalidBody("update body must be a JSON object".to_string()))?;
        let filter = self.pk_filter(id)?;
        self.update_statement(patch, std::slice::from_ref(&filter))
    }

    fn update_statement(
        &self,
        patch: &Map<String, JsonValue>,
        filters: &[Filter],
    ) -> Result<BuiltQuery> {
        if patch.is_empty() {
            return Err(Error::ValidationError(
                "No update values provided".to_string(),
            ));
        }

        let columns = patch
            .keys()
            .map(|k| self.column(k))
            .collect::<Result<Vec<_>>>()?;
        self.validate_columns(filters.iter().map(|f| f.column.as_str()))?;

        let mut binds = Params::default();
        let assignments = columns
            .iter()
            .map(|col| {
                let placeholder = binds.push(column_bind(&patch[&col.name], col), cast_type(col));
                Ok(format!("{} = {placeholder}", quote_ident(&col.name)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table_ref()?,
            assignments.join(", ")
        );
        if let Some(clause) = self.where_clause(filters, &mut binds)? {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        sql.push_str(&self.returning()?);

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    // ------------------------------------------------------------------
    // DELETE
    // ------------------------------------------------------------------

    /// Batch DELETE; an empty filter set is refused
    pub fn build_delete(&self, filters: &[Filter]) -> Result<BuiltQuery> {
        if filters.is_empty() {
            return Err(Error::MissingFilter("Batch delete"));
        }
        self.validate_columns(filters.iter().map(|f| f.column.as_str()))?;

        let mut binds = Params::default();
        let mut sql = format!("DELETE FROM {}", self.table_ref()?);
        if let Some(clause) = self.where_clause(filters, &mut binds)? {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        sql.push_str(&self.returning()?);

        Ok(BuiltQuery {
            sql,
            params: binds.values,
        })
    }

    /// DELETE of one row by primary key
    pub fn build_delete_by_pk(&self, id: &str) -> Result<BuiltQuery> {
        let filter = self.pk_filter(id)?;
        self.build_delete(std::slice::from_ref(&filter))
    }

    fn pk_filter(&self, id: &str) -> Result<Filter> {
        let pk = self.single_primary_key()?;
        Ok(Filter::and(
            pk.name.clone(),
            FilterOperator::Eq,
            FilterValue::Text(id.to_string()),
        ))
    }
}

/// Catalog types the row decoder reads without a text projection
const NATIVE_TYPES: &[&str] = &[
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "real",
    "double precision",
    "numeric",
    "text",
    "character varying",
    "character",
    "name",
    "uuid",
    "json",
    "jsonb",
    "bytea",
    "timestamp without time zone",
    "timestamp with time zone",
    "date",
    "time without time zone",
    "bool[]",
    "int2[]",
    "int4[]",
    "int8[]",
    "float4[]",
    "float8[]",
    "text[]",
    "varchar[]",
    "bpchar[]",
    "name[]",
    "uuid[]",
    "timestamp[]",
    "timestamptz[]",
    "date[]",
    "time[]",
];

fn decodes_natively(column: &ColumnInfo) -> bool {
    NATIVE_TYPES.contains(&column.data_type.as_str())
}

fn selects_all(select: &[String]) -> bool {
    select.is_empty() || select.iter().any(|c| c == "*")
}

fn is_text_column(column: &ColumnInfo) -> bool {
    matches!(
        column.data_type.as_str(),
        "text" | "character varying" | "character" | "name" | "citext"
    )
}

/// Cast applied to a placeholder so text-bound values compare against typed columns.
///
/// Only plain lowercase type names (as reported by `information_schema`) are
/// used; anything else binds uncast. A bare `character` or `bit` means length
/// one, so those cast to their unbounded forms.
fn cast_type(column: &ColumnInfo) -> Option<&str> {
    let ty = match column.data_type.as_str() {
        "character" => "bpchar",
        "bit" => "varbit",
        "bit[]" => "varbit[]",
        other => other,
    };
    let base = ty.strip_suffix("[]").unwrap_or(ty);
    let plain = base.starts_with(|c: char| c.is_ascii_lowercase())
        && base
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' || c == '_');
    plain.then_some(ty)
}

fn is_json_column(column: &ColumnInfo) -> bool {
    matches!(column.data_type.as_str(), "json" | "jsonb")
}

/// Bind a filter value that must be a scalar
fn scalar_bind(value: &FilterValue) -> Result<BindValue> {
    match value {
        FilterValue::Text(s) => Ok(BindValue::Text(s.clone())),
        FilterValue::Number(n) => Ok(number_bind(n)),
        FilterValue::Bool(b) => Ok(BindValue::Bool(*b)),
        FilterValue::Null => Ok(BindValue::Null),
        FilterValue::List(_) => Err(Error::InvalidFilter(
            "nested lists are not supported".to_string(),
        )),
    }
}

fn number_bind(n: &serde_json::Number) -> BindValue {
    match n.as_i64() {
        Some(i) => BindValue::Int(i),
        None => BindValue::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Keyword for `IS` comparisons
fn is_keyword(value: &FilterValue) -> Result<&'static str> {
    match value {
        FilterValue::Null => Ok("NULL"),
        FilterValue::Bool(true) => Ok("TRUE"),
        FilterValue::Bool(false) => Ok("FALSE"),
        FilterValue::Text(s) => match s.to_ascii_lowercase().as_str() {
            "null" => Ok("NULL"),
            "not_null" | "not.null" => Ok("NOT NULL"),
            "true" => Ok("TRUE"),
            "false" => Ok("FALSE"),
            "unknown" => Ok("UNKNOWN"),
            _ => Err(Error::InvalidFilter(format!("Invalid IS value: {s}"))),
        },
        other => Err(Error::InvalidFilter(format!("Invalid IS value: {other}"))),
    }
}

/// Bind a request-body value destined for `column`
fn column_bind(value: &JsonValue, column: &ColumnInfo) -> BindValue {
    if value.is_null() {
        return BindValue::Null;
    }
    if is_json_column(column) {
        return BindValue::Json(value.clone());
    }

    match value {
        JsonValue::Null => BindValue::Null,
        JsonValue::Bool(b) => BindValue::Bool(*b),
        JsonValue::Number(n) => number_bind(n),
        JsonValue::String(s) => BindValue::Text(s.clone()),
        JsonValue::Array(items) => BindValue::Text(pg_array_literal(items)),
        JsonValue::Object(_) => BindValue::Json(value.clone()),
    }
}

/// Render a JSON array as a Postgres array literal, e.g. `{"a","b"}`
fn pg_array_literal(items: &[JsonValue]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            JsonValue::Array(nested) => pg_array_literal(nested),
            other => other.to_string(),
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}
