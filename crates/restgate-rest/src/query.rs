//! Query parameter compilation for PostgREST-compatible requests
//!
//! Both the query string and the JSON `PostQueryRequest` body compile into the
//! same canonical [`QueryParams`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use restgate_common::error::{Error, Result};

use crate::filter::{
    parse_and_group, parse_operator_value, parse_or_group, Filter, FilterOperator, FilterValue,
};

/// Query-string keys that never denote a column filter
pub const RESERVED_PARAMS: [&str; 11] = [
    "select",
    "order",
    "limit",
    "offset",
    "count",
    "group_by",
    "or",
    "and",
    "on_conflict",
    "columns",
    "default_to_null",
];

/// Canonical query parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Projected columns; empty means all columns
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub count: Option<CountType>,
    pub group_by: Vec<String>,
}

/// Order clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub desc: bool,
    pub nulls: NullsOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
    Default,
}

impl NullsOrder {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "first" | "nullsfirst" => Some(Self::First),
            "last" | "nullslast" => Some(Self::Last),
            "" => Some(Self::Default),
            _ => None,
        }
    }
}

/// Count type for responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountType {
    Exact,
    Planned,
    Estimated,
}

impl CountType {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "planned" => Some(Self::Planned),
            "estimated" => Some(Self::Estimated),
            _ => None,
        }
    }
}

/// Sequential OR-group ids, unique within one request
#[derive(Debug)]
struct GroupIds(u32);

impl GroupIds {
    fn new() -> Self {
        Self(0)
    }

    fn next(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }
}

// ============================================================================
// JSON body (POST /{table}/query)
// ============================================================================

/// Structured query body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostQueryRequest {
    pub select: String,
    pub filters: Vec<PostQueryFilter>,
    pub or_filters: Vec<String>,
    pub and_filters: Vec<String>,
    pub between_filters: Vec<PostQueryBetweenFilter>,
    pub order: Vec<PostQueryOrder>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub count: Option<CountType>,
    pub group_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostQueryFilter {
    pub column: String,
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostQueryBetweenFilter {
    pub column: String,
    pub min: JsonValue,
    pub max: JsonValue,
    #[serde(default)]
    pub negated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostQueryOrder {
    pub column: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub nulls: String,
}

impl PostQueryRequest {
    /// Compile into canonical parameters.
    ///
    /// Filters are concatenated as direct, between-derived, OR groups, AND groups.
    pub fn compile(&self) -> Result<QueryParams> {
        let mut groups = GroupIds::new();
        let mut filters = Vec::new();

        for f in &self.filters {
            let operator = FilterOperator::parse(&f.operator).ok_or_else(|| {
                Error::InvalidFilter(format!("unknown operator '{}'", f.operator))
            })?;
            filters.push(Filter::and(
                f.column.clone(),
                operator,
                FilterValue::from_json(f.value.clone())?,
            ));
        }

        for between in &self.between_filters {
            filters.extend(desugar_between(between, &mut groups)?);
        }

        for group in &self.or_filters {
            filters.extend(parse_or_group(group, groups.next())?);
        }

        for group in &self.and_filters {
            filters.extend(parse_and_group(group)?);
        }

        let order = self
            .order
            .iter()
            .map(|o| {
                let nulls = NullsOrder::parse(&o.nulls).ok_or_else(|| {
                    Error::InvalidQueryParam(format!("invalid nulls ordering '{}'", o.nulls))
                })?;
                Ok(OrderBy {
                    column: o.column.clone(),
                    desc: o.direction.to_ascii_lowercase() == "desc",
                    nulls,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryParams {
            select: parse_select(&self.select),
            filters,
            order,
            limit: check_non_negative("limit", self.limit)?,
            offset: check_non_negative("offset", self.offset)?,
            count: self.count,
            group_by: self.group_by.iter().map(|c| c.trim().to_string()).collect(),
        })
    }
}

/// Desugar a BETWEEN into two comparisons.
///
/// `min <= col <= max` becomes two AND filters; the negated form becomes one
/// OR group `col < min OR col > max`.
fn desugar_between(between: &PostQueryBetweenFilter, groups: &mut GroupIds) -> Result<[Filter; 2]> {
    let min = FilterValue::from_json(between.min.clone())?;
    let max = FilterValue::from_json(between.max.clone())?;

    if between.negated {
        let group = groups.next();
        Ok([
            Filter::or(between.column.clone(), FilterOperator::Lt, min, group),
            Filter::or(between.column.clone(), FilterOperator::Gt, max, group),
        ])
    } else {
        Ok([
            Filter::and(between.column.clone(), FilterOperator::Gte, min),
            Filter::and(between.column.clone(), FilterOperator::Lte, max),
        ])
    }
}

// ============================================================================
// Query string (GET/PATCH/DELETE /{table})
// ============================================================================

impl QueryParams {
    /// Parse query string into canonical parameters
    pub fn from_query_string(query_string: &str) -> Result<Self> {
        let pairs = decode_query_string(query_string)?;

        let mut params = QueryParams::default();
        let mut groups = GroupIds::new();
        let mut or_filters = Vec::new();
        let mut and_filters = Vec::new();

        for (key, value) in &pairs {
            match key.as_str() {
                "select" => params.select = parse_select(value),
                "order" => params.order = parse_order(value)?,
                "limit" => params.limit = Some(parse_non_negative("limit", value)?),
                "offset" => params.offset = Some(parse_non_negative("offset", value)?),
                "count" => {
                    params.count = Some(CountType::parse(value).ok_or_else(|| {
                        Error::InvalidQueryParam(format!("count: unknown count type '{value}'"))
                    })?);
                }
                "group_by" => params.group_by = parse_select(value),
                "or" => or_filters.extend(parse_or_group(value, groups.next())?),
                "and" => and_filters.extend(parse_and_group(value)?),
                k if RESERVED_PARAMS.contains(&k) => {}
                column => {
                    let (operator, value) = parse_operator_value(value)?;
                    params.filters.push(Filter::and(column, operator, value));
                }
            }
        }

        params.filters.extend(or_filters);
        params.filters.extend(and_filters);
        Ok(params)
    }

    /// Only filters; used by PATCH and DELETE
    pub fn filters_from_query_string(query_string: &str) -> Result<Vec<Filter>> {
        Ok(Self::from_query_string(query_string)?.filters)
    }
}

/// Look up a single reserved parameter without compiling the rest
pub fn query_param(query_string: &str, name: &str) -> Result<Option<String>> {
    Ok(decode_query_string(query_string)?
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v))
}

/// Decode `application/x-www-form-urlencoded` pairs, rejecting invalid UTF-8
fn decode_query_string(query_string: &str) -> Result<Vec<(String, String)>> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query_string.as_bytes())
        .into_owned()
        .collect();

    // The decoder is lossy; a replacement character that was not in the raw input means bad escapes
    if !query_string.contains('\u{FFFD}')
        && pairs
            .iter()
            .any(|(k, v)| k.contains('\u{FFFD}') || v.contains('\u{FFFD}'))
    {
        return Err(Error::InvalidQueryParam(
            "invalid query string encoding".to_string(),
        ));
    }

    Ok(pairs)
}

/// Parse comma-separated column list; empty input selects all columns
fn parse_select(select: &str) -> Vec<String> {
    select
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse `col.asc|desc[.nullsfirst|nullslast]` entries
fn parse_order(order: &str) -> Result<Vec<OrderBy>> {
    let mut clauses = Vec::new();

    for part in order.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let mut segments = part.split('.');
        let column = segments.next().unwrap_or_default().to_string();
        let mut desc = false;
        let mut nulls = NullsOrder::Default;

        for segment in segments {
            match segment.to_ascii_lowercase().as_str() {
                "asc" => desc = false,
                "desc" => desc = true,
                "nullsfirst" => nulls = NullsOrder::First,
                "nullslast" => nulls = NullsOrder::Last,
                other => {
                    return Err(Error::InvalidQueryParam(format!(
                        "order: unexpected modifier '{other}' for column '{column}'"
                    )))
                }
            }
        }

        clauses.push(OrderBy {
            column,
            desc,
            nulls,
        });
    }

    Ok(clauses)
}

fn parse_non_negative(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::InvalidQueryParam(format!("{name}: expected a non-negative integer")))
}

fn check_non_negative(name: &str, value: Option<i64>) -> Result<Option<i64>> {
    match value {
        Some(n) if n < 0 => Err(Error::InvalidQueryParam(format!(
            "{name}: expected a non-negative integer"
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> PostQueryRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_parse_simple_filter() {
        let query = QueryParams::from_query_string("name=eq.John").unwrap();
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].column, "name");
        assert_eq!(query.filters[0].operator, FilterOperator::Eq);
    }

    #[test]
    fn test_parse_order() {
        let query =
            QueryParams::from_query_string("order=created_at.desc.nullslast,name").unwrap();
        assert_eq!(query.order.len(), 2);
        assert_eq!(query.order[0].column, "created_at");
        assert!(query.order[0].desc);
        assert_eq!(query.order[0].nulls, NullsOrder::Last);
        assert!(!query.order[1].desc);
        assert_eq!(query.order[1].nulls, NullsOrder::Default);
    }

    #[test]
    fn test_parse_limit_offset() {
        let query = QueryParams::from_query_string("limit=10&offset=20").unwrap();
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));

        assert!(QueryParams::from_query_string("limit=ten").is_err());
        assert!(QueryParams::from_query_string("offset=-1").is_err());
    }

    #[test]
    fn test_parse_select_trims() {
        let query = QueryParams::from_query_string("select=id,%20name%20,email").unwrap();
        assert_eq!(query.select, vec!["id", "name", "email"]);

        let query = QueryParams::from_query_string("select=").unwrap();
        assert!(query.select.is_empty());
    }

    #[test]
    fn test_query_string_or_and_groups() {
        let query = QueryParams::from_query_string(
            "or=(status.eq.active,status.eq.pending)&age=gte.18&and=(name.like.A*,id.neq.3)",
        )
        .unwrap();
        let columns: Vec<&str> = query.filters.iter().map(|f| f.column.as_str()).collect();
        // direct first, then OR, then AND
        assert_eq!(columns, vec!["age", "status", "status", "name", "id"]);
        assert!(query.filters[1].is_or && query.filters[2].is_or);
        assert_eq!(query.filters[1].or_group_id, query.filters[2].or_group_id);
        assert!(!query.filters[3].is_or);
    }

    #[test]
    fn test_query_string_malformed_or() {
        let err = QueryParams::from_query_string("or=(status.eq)").unwrap_err();
        assert!(err.to_string().starts_with("invalid OR filter format"));
    }

    #[test]
    fn test_reserved_params_not_filters() {
        let query =
            QueryParams::from_query_string("on_conflict=id&default_to_null=true&count=exact")
                .unwrap();
        assert!(query.filters.is_empty());
        assert_eq!(query.count, Some(CountType::Exact));
    }

    #[test]
    fn test_in_filter() {
        let query = QueryParams::from_query_string("status=in.(active,pending,done)").unwrap();
        assert_eq!(query.filters.len(), 1);
        if let FilterValue::List(values) = &query.filters[0].value {
            assert_eq!(values.len(), 3);
        } else {
            panic!("Expected list value");
        }
    }

    #[test]
    fn test_invalid_encoding() {
        let err = QueryParams::from_query_string("name=eq.%FF%FE").unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParam(_)));
    }

    #[test]
    fn test_query_param_lookup() {
        assert_eq!(
            query_param("on_conflict=tenant_id,%20user_id&x=eq.1", "on_conflict").unwrap(),
            Some("tenant_id, user_id".to_string())
        );
        assert_eq!(query_param("x=eq.1", "on_conflict").unwrap(), None);
    }

    #[test]
    fn test_compile_ordering() {
        let req = request(json!({
            "select": "id, name",
            "filters": [{"column": "status", "operator": "eq", "value": "active"}],
            "or_filters": ["role.eq.admin,role.eq.owner"],
            "and_filters": ["age.gt.1"],
            "between_filters": [
                {"column": "score", "min": 10, "max": 20},
                {"column": "age", "min": 18, "max": 65, "negated": true}
            ],
            "order": [{"column": "name", "direction": "DESC", "nulls": "LAST"}],
            "limit": 5,
            "count": "exact",
            "group_by": ["status"]
        }));
        let params = req.compile().unwrap();

        let summary: Vec<(&str, FilterOperator, bool, u32)> = params
            .filters
            .iter()
            .map(|f| (f.column.as_str(), f.operator, f.is_or, f.or_group_id))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("status", FilterOperator::Eq, false, 0),
                ("score", FilterOperator::Gte, false, 0),
                ("score", FilterOperator::Lte, false, 0),
                ("age", FilterOperator::Lt, true, 1),
                ("age", FilterOperator::Gt, true, 1),
                ("role", FilterOperator::Eq, true, 2),
                ("role", FilterOperator::Eq, true, 2),
                ("age", FilterOperator::Gt, false, 0),
            ]
        );
        assert_eq!(params.select, vec!["id", "name"]);
        assert!(params.order[0].desc);
        assert_eq!(params.order[0].nulls, NullsOrder::Last);
        assert_eq!(params.limit, Some(5));
        assert_eq!(params.offset, None);
        assert_eq!(params.count, Some(CountType::Exact));
        assert_eq!(params.group_by, vec!["status"]);
    }

    #[test]
    fn test_compile_rejects_malformed_and() {
        let req = request(json!({"and_filters": ["status.eq.active", "status"]}));
        let err = req.compile().unwrap_err();
        assert!(err.to_string().starts_with("invalid AND filter format"));
    }

    #[test]
    fn test_compile_rejects_unknown_operator() {
        let req = request(json!({"filters": [{"column": "a", "operator": "near", "value": 1}]}));
        assert!(matches!(req.compile(), Err(Error::InvalidFilter(_))));
    }

    #[test]
    fn test_compile_rejects_negative_paging() {
        let err = request(json!({"offset": -5})).compile().unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParam(_)));
        assert_eq!(err.status_code(), 400);

        let err = request(json!({"limit": -1})).compile().unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParam(_)));

        let params = request(json!({"limit": 0, "offset": 0})).compile().unwrap();
        assert_eq!((params.limit, params.offset), (Some(0), Some(0)));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let req = request(json!({
            "filters": [{"column": "a", "operator": "eq", "value": 1}],
            "or_filters": ["b.eq.1,b.eq.2", "c.eq.3,c.eq.4"],
            "between_filters": [{"column": "d", "min": 1, "max": 2, "negated": true}]
        }));
        assert_eq!(req.compile().unwrap(), req.compile().unwrap());
    }

    proptest! {
        #[test]
        fn prop_between_plain(min in any::<i64>(), max in any::<i64>()) {
            let req = PostQueryRequest {
                between_filters: vec![PostQueryBetweenFilter {
                    column: "x".into(), min: json!(min), max: json!(max), negated: false,
                }],
                ..Default::default()
            };
            let filters = req.compile().unwrap().filters;
            prop_assert_eq!(filters.len(), 2);
            prop_assert!(filters.iter().all(|f| !f.is_or && f.or_group_id == 0));
            prop_assert_eq!(filters[0].operator, FilterOperator::Gte);
            prop_assert_eq!(&filters[0].value, &FilterValue::Number(min.into()));
            prop_assert_eq!(filters[1].operator, FilterOperator::Lte);
            prop_assert_eq!(&filters[1].value, &FilterValue::Number(max.into()));
        }

        #[test]
        fn prop_between_negated(min in any::<i64>(), max in any::<i64>()) {
            let req = PostQueryRequest {
                between_filters: vec![PostQueryBetweenFilter {
                    column: "x".into(), min: json!(min), max: json!(max), negated: true,
                }],
                ..Default::default()
            };
            let filters = req.compile().unwrap().filters;
            prop_assert_eq!(filters.len(), 2);
            prop_assert!(filters.iter().all(|f| f.is_or));
            prop_assert_eq!(filters[0].or_group_id, filters[1].or_group_id);
            prop_assert!(filters[0].or_group_id != 0);
            prop_assert_eq!(filters[0].operator, FilterOperator::Lt);
            prop_assert_eq!(&filters[0].value, &FilterValue::Number(min.into()));
            prop_assert_eq!(filters[1].operator, FilterOperator::Gt);
            prop_assert_eq!(&filters[1].value, &FilterValue::Number(max.into()));
        }
    }
}
