//! PostgREST-compatible response shaping
//!
//! Everything here is pure: the handlers turn a [`ResponsePlan`] into an
//! actix response.

use serde_json::Value as JsonValue;

use crate::decode::JsonRow;
use crate::query::CountType;

pub const CONTENT_RANGE: &str = "Content-Range";
pub const AFFECTED_COUNT: &str = "X-Affected-Count";

/// `Prefer: return=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    Minimal,
    HeadersOnly,
    #[default]
    Representation,
}

impl ReturnPreference {
    /// Anything other than `minimal` or `headers-only` asks for the rows back
    pub fn from_prefer(header: &str) -> Self {
        let mut pref = Self::Representation;
        for (key, value) in prefer_tokens(header) {
            if key == "return" {
                pref = match value {
                    "minimal" => Self::Minimal,
                    "headers-only" => Self::HeadersOnly,
                    _ => Self::Representation,
                };
            }
        }
        pref
    }
}

/// `Prefer: resolution=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MergeDuplicates,
    IgnoreDuplicates,
}

/// Parsed `Prefer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    pub return_pref: ReturnPreference,
    pub count: Option<CountType>,
    pub resolution: Option<Resolution>,
}

impl Preferences {
    pub fn parse(header: &str) -> Self {
        let mut prefs = Self {
            return_pref: ReturnPreference::from_prefer(header),
            ..Self::default()
        };

        for (key, value) in prefer_tokens(header) {
            match key {
                "count" => prefs.count = CountType::parse(value),
                "resolution" => {
                    prefs.resolution = match value {
                        "merge-duplicates" => Some(Resolution::MergeDuplicates),
                        "ignore-duplicates" => Some(Resolution::IgnoreDuplicates),
                        _ => None,
                    };
                }
                _ => {}
            }
        }

        prefs
    }
}

/// `key=value` pairs of a Prefer header; separators are `,` or `;`
fn prefer_tokens(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header
        .split([',', ';'])
        .filter_map(|token| token.trim().split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
}

/// Content-Range value: `start-end/total`, `*` when the total is unknown
pub fn content_range(offset: i64, count: usize, total: Option<i64>) -> String {
    let start = offset.max(0);
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    let end = if count == 0 { start } else { start + count - 1 };
    match total {
        Some(total) => format!("{start}-{end}/{total}"),
        None => format!("{start}-{end}/*"),
    }
}

pub fn affected_count_header(n: u64) -> String {
    n.to_string()
}

/// Kind of mutation being answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

/// Status, body and headers for one response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePlan {
    pub status: u16,
    pub body: Option<JsonValue>,
    pub headers: Vec<(&'static str, String)>,
}

/// Collection read: rows as an array plus Content-Range
pub fn collection_response(rows: Vec<JsonRow>, offset: i64, total: Option<i64>) -> ResponsePlan {
    let range = content_range(offset, rows.len(), total);
    ResponsePlan {
        status: 200,
        body: Some(rows_to_json(rows)),
        headers: vec![(CONTENT_RANGE, range)],
    }
}

/// Single-row read: the object itself
pub fn single_response(row: JsonRow) -> ResponsePlan {
    ResponsePlan {
        status: 200,
        body: Some(JsonValue::Object(row)),
        headers: vec![],
    }
}

/// Mutation response.
///
/// `single` answers with the first row as an object instead of an array.
pub fn mutation_response(
    mutation: Mutation,
    rows: Vec<JsonRow>,
    affected: u64,
    return_pref: ReturnPreference,
    single: bool,
) -> ResponsePlan {
    let representation = return_pref == ReturnPreference::Representation;

    let status = match (mutation, representation) {
        (Mutation::Create, _) => 201,
        (_, true) => 200,
        (_, false) => 204,
    };

    let body = representation.then(|| {
        if single {
            rows.into_iter()
                .next()
                .map_or(JsonValue::Null, JsonValue::Object)
        } else {
            rows_to_json(rows)
        }
    });

    ResponsePlan {
        status,
        body,
        headers: vec![(AFFECTED_COUNT, affected_count_header(affected))],
    }
}

fn rows_to_json(rows: Vec<JsonRow>) -> JsonValue {
    JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect())
}
