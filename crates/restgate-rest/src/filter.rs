//! Filter grammar for PostgREST-style `column.operator.value` expressions

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use restgate_common::error::{Error, Result};

/// Filter operators matching PostgREST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,    // =
    Neq,   // !=
    Gt,    // >
    Gte,   // >=
    Lt,    // <
    Lte,   // <=
    Like,  // LIKE
    Ilike, // ILIKE
    In,    // IN
    Is,    // IS (NULL, TRUE, FALSE)
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Like,
        Self::Ilike,
        Self::In,
        Self::Is,
    ];

    /// Parse an operator token; `None` for anything outside the closed set
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }

    /// Grammar token
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::In => "in",
            Self::Is => "is",
        }
    }

    /// SQL operator
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
            Self::In => "IN",
            Self::Is => "IS",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Convert a JSON request-body value; objects have no filter meaning
    pub fn from_json(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(b)),
            JsonValue::Number(n) => Ok(Self::Number(n)),
            JsonValue::String(s) => Ok(Self::Text(s)),
            JsonValue::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            JsonValue::Object(_) => Err(Error::InvalidFilter(
                "object values are not supported in filters".to_string(),
            )),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}

/// Filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    pub is_or: bool,
    /// Nonzero for members of an OR group
    pub or_group_id: u32,
}

impl Filter {
    /// Filter AND-ed at the top level
    pub fn and(column: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
            is_or: false,
            or_group_id: 0,
        }
    }

    /// Member of OR group `group_id`
    pub fn or(
        column: impl Into<String>,
        operator: FilterOperator,
        value: FilterValue,
        group_id: u32,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
            is_or: true,
            or_group_id: group_id,
        }
    }

    /// Whether this filter belongs to a parenthesized OR group
    pub fn in_or_group(&self) -> bool {
        self.is_or && self.or_group_id != 0
    }
}

/// Which logical keyword a filter list was passed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Or,
    And,
}

impl GroupKind {
    fn format_error(self, segment: &str) -> Error {
        match self {
            Self::Or => Error::invalid_or_format(segment),
            Self::And => Error::invalid_and_format(segment),
        }
    }
}

/// Parse an OR group such as `(status.eq.active,status.eq.pending)`.
///
/// Every filter in the group shares `group_id`.
pub fn parse_or_group(input: &str, group_id: u32) -> Result<Vec<Filter>> {
    parse_group(input, GroupKind::Or)?
        .into_iter()
        .map(|(column, operator, value)| Ok(Filter::or(column, operator, value, group_id)))
        .collect()
}

/// Parse an AND group; the filters join the flat top-level AND list
pub fn parse_and_group(input: &str) -> Result<Vec<Filter>> {
    parse_group(input, GroupKind::And)?
        .into_iter()
        .map(|(column, operator, value)| Ok(Filter::and(column, operator, value)))
        .collect()
}

fn parse_group(input: &str, kind: GroupKind) -> Result<Vec<(String, FilterOperator, FilterValue)>> {
    let inner = strip_parens(input.trim());

    split_top_level(inner, ',')
        .iter()
        .map(|segment| parse_segment(segment.trim(), kind))
        .collect()
}

/// Split one `column.operator.value` segment. Only the first two dots count.
fn parse_segment(segment: &str, kind: GroupKind) -> Result<(String, FilterOperator, FilterValue)> {
    let parts: Vec<&str> = segment.splitn(3, '.').collect();
    let [column, op, value] = parts.as_slice() else {
        return Err(kind.format_error(segment));
    };

    if column.is_empty() || op.is_empty() {
        return Err(kind.format_error(segment));
    }

    let operator = FilterOperator::parse(op)
        .ok_or_else(|| Error::InvalidFilter(format!("unknown operator '{op}' in '{segment}'")))?;

    Ok((
        (*column).to_string(),
        operator,
        parse_value(operator, value),
    ))
}

/// Parse the right-hand side of a query-string filter, e.g. `eq.active` or `in.(1,2)`
pub fn parse_operator_value(raw: &str) -> Result<(FilterOperator, FilterValue)> {
    let (op, value) = raw
        .split_once('.')
        .ok_or_else(|| Error::InvalidFilter(format!("expected operator.value, got '{raw}'")))?;

    let operator = FilterOperator::parse(op)
        .ok_or_else(|| Error::InvalidFilter(format!("unknown operator '{op}'")))?;

    Ok((operator, parse_value(operator, value)))
}

/// Values stay untyped text; only the `in` list shape is recognized here
fn parse_value(operator: FilterOperator, value: &str) -> FilterValue {
    if operator == FilterOperator::In {
        let inner = strip_parens(value);
        let items = split_top_level(inner, ',')
            .into_iter()
            .map(|item| {
                let item = item.trim();
                let item = item
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(item);
                FilterValue::Text(item.to_string())
            })
            .collect();
        return FilterValue::List(items);
    }

    FilterValue::Text(value.to_string())
}

/// Render a filter back into its `column.operator.value` form
pub fn format_filter(filter: &Filter) -> String {
    format!("{}.{}.{}", filter.column, filter.operator, filter.value)
}

fn strip_parens(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(s)
}

/// Split string by delimiter, respecting parentheses nesting
pub(crate) fn split_top_level(s: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == delimiter && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }

    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_or_group() {
        let filters = parse_or_group("status.eq.active,status.eq.pending", 7).unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|f| f.is_or && f.or_group_id == 7));
        assert_eq!(filters[1].value, FilterValue::Text("pending".into()));
    }

    #[test]
    fn test_parse_parenthesized_group() {
        let filters = parse_or_group("(age.lt.18,age.gt.65)", 1).unwrap();
        assert_eq!(filters[0].operator, FilterOperator::Lt);
        assert_eq!(filters[1].operator, FilterOperator::Gt);
    }

    #[test]
    fn test_parse_and_group() {
        let filters = parse_and_group("age.gte.18,name.like.A*").unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|f| !f.is_or && f.or_group_id == 0));
    }

    #[test]
    fn test_value_keeps_extra_dots() {
        let filters = parse_and_group("email.eq.alice@example.co.uk").unwrap();
        assert_eq!(filters[0].column, "email");
        assert_eq!(
            filters[0].value,
            FilterValue::Text("alice@example.co.uk".into())
        );
    }

    #[test]
    fn test_in_list_not_split_by_group_comma() {
        let filters = parse_or_group("id.in.(1,2,3),name.eq.x", 2).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[0].value,
            FilterValue::List(vec![
                FilterValue::Text("1".into()),
                FilterValue::Text("2".into()),
                FilterValue::Text("3".into()),
            ])
        );
    }

    #[test]
    fn test_malformed_segments_rejected() {
        for bad in ["status.eq", "status", "status.eq.active,status"] {
            let err = parse_or_group(bad, 1).unwrap_err();
            assert!(err.to_string().starts_with("invalid OR filter format"), "{bad}");
            let err = parse_and_group(bad).unwrap_err();
            assert!(err.to_string().starts_with("invalid AND filter format"), "{bad}");
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse_and_group("age.between.1").unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
        assert!(FilterOperator::parse("between").is_none());
        assert_eq!(FilterOperator::parse("GTE"), Some(FilterOperator::Gte));
    }

    #[test]
    fn test_parse_operator_value() {
        let (op, value) = parse_operator_value("is.null").unwrap();
        assert_eq!(op, FilterOperator::Is);
        assert_eq!(value, FilterValue::Text("null".into()));

        assert!(parse_operator_value("active").is_err());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            FilterValue::from_json(serde_json::json!([1, "a"])).unwrap(),
            FilterValue::List(vec![
                FilterValue::Number(1.into()),
                FilterValue::Text("a".into())
            ])
        );
        assert!(FilterValue::from_json(serde_json::json!({"a": 1})).is_err());
    }

    fn column_strategy() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,12}"
    }

    fn value_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9@._-]{0,16}"
    }

    proptest! {
        #[test]
        fn prop_segment_round_trip(
            column in column_strategy(),
            op_index in 0usize..9,
            value in value_strategy(),
        ) {
            // `in` is excluded: its value is list-shaped
            let ops: Vec<FilterOperator> = FilterOperator::ALL
                .into_iter()
                .filter(|op| *op != FilterOperator::In)
                .collect();
            let operator = ops[op_index];
            let encoded = format!("{column}.{operator}.{value}");
            let parsed = parse_and_group(&encoded).unwrap();
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(&parsed[0].column, &column);
            prop_assert_eq!(parsed[0].operator, operator);
            prop_assert_eq!(&parsed[0].value, &FilterValue::Text(value.clone()));
            prop_assert_eq!(format_filter(&parsed[0]), encoded);
        }
    }
}
